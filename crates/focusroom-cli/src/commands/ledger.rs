use clap::Subcommand;
use focusroom_core::storage::Database;

#[derive(Subcommand)]
pub enum LedgerAction {
    /// Current point balance
    Balance,
    /// Most recent ledger entries
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: LedgerAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        LedgerAction::Balance => {
            println!("{}", db.balance()?);
        }
        LedgerAction::History { limit } => {
            let entries = db.ledger_entries(limit)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}
