use clap::Subcommand;
use focusroom_core::Config;

#[derive(Subcommand)]
pub enum TemplateAction {
    /// List configured templates
    List,
    /// Show one template
    Show {
        /// Template name
        name: String,
    },
}

pub fn run(action: TemplateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    match action {
        TemplateAction::List => {
            println!("{}", serde_json::to_string_pretty(&config.templates)?);
        }
        TemplateAction::Show { name } => {
            let template = config.template(&name)?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
    }
    Ok(())
}
