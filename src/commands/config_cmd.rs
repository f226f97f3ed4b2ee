use clap::{Args, Subcommand, ValueEnum};

use versetrack::config::Config;

#[derive(Debug, Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_text(config),
                }
                Ok(())
            }
        }
    }
}

fn print_text(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    if let Some(path) = &config.config_file {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        );
    }
    println!();

    println!("database_path: {}", config.database_path.value.display());
    println!("  source: {}", config.database_path.source);
    println!();

    println!("log_filter: {}", config.log_filter.value);
    println!("  source: {}", config.log_filter.source);
    println!();

    println!("remote:");
    println!(
        "  url: {}",
        config.remote.url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  api_key: {}",
        if config.remote.api_key.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!("  timeout_secs: {}", config.remote.timeout_secs);
    println!();

    let sync = &config.sync;
    println!("sync:");
    println!("  min_backoff_ms: {}", sync.min_backoff_ms);
    println!("  max_backoff_ms: {}", sync.max_backoff_ms);
    println!("  debounce_ms: {}", sync.debounce_ms);
    println!("  probe_interval_secs: {}", sync.probe_interval_secs);
    println!("  pull_on_start: {}", sync.pull_on_start);
    println!("  pull_policy: {:?}", sync.pull_policy);
}
