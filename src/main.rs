use clap::Parser;
use exit_guard::cli::{Cli, Commands};
use exit_guard::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; unusable sections fall back to defaults
    let config = Config::load_or_default(&cli.config);

    // Initialize telemetry
    let _telemetry = exit_guard::telemetry::init_telemetry(&config.telemetry)?;
    for gap in &config.gaps {
        tracing::warn!(%gap, "Configuration section replaced by defaults");
    }

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(mode = ?config.execution.mode, "Starting exit guard");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            for gap in &config.gaps {
                println!("# defaulted: {gap}");
            }
        }
        Commands::Curves(args) => args.execute(&config)?,
    }

    Ok(())
}
