use clap::Subcommand;
use focusroom_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value
    Get {
        /// Dot path, e.g. "engine.grace_period_secs" or "templates.0.work_secs"
        key: String,
    },
    /// Change one value; rejected if it would leave a template unrunnable
    Set {
        key: String,
        value: String,
    },
    /// Print every key as `key = value`
    List {
        /// Print the whole document as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Overwrite the config file with defaults
    Reset,
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let value = Config::load()?
                .get(&key)
                .ok_or_else(|| format!("unknown key: {key} (see `focusroom config list`)"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            let previous = config.get(&key);
            config.set(&key, &value)?;
            let current = config.get(&key).unwrap_or(value);
            match previous {
                Some(previous) if previous != current => {
                    println!("{key}: {previous} -> {current}")
                }
                _ => println!("{key}: {current}"),
            }
        }
        ConfigAction::List { json: true } => {
            println!("{}", serde_json::to_string_pretty(&Config::load()?)?);
        }
        ConfigAction::List { json: false } => {
            for (key, value) in Config::load()?.entries() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Reset => {
            let path = Config::path()?;
            Config::default().save_to(&path)?;
            tracing::info!(path = %path.display(), "config reset");
            println!("reset {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
    }
    Ok(())
}
