mod config_cmd;
mod run;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use run::RunCommand;
pub use sync_cmd::SyncCommand;
