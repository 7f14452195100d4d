pub mod config;
pub mod ledger;
pub mod session;
pub mod stats;
pub mod template;
