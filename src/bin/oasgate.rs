use clap::Parser;
use oasgate::cli::{run_cli, Cli};
use oasgate::logging::{init_logging_with_config, LogConfig};

fn main() {
    let cli = Cli::parse();
    let mut log_config = LogConfig::from_env();
    if std::env::var("OASGATE_LOG_LEVEL").is_err() {
        log_config.log_level = "warn".to_string();
    }
    if let Err(e) = init_logging_with_config(&log_config) {
        eprintln!("warning: {e}");
    }
    if let Err(e) = run_cli(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
