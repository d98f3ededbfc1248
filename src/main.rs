use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{filter::Directive, EnvFilter};

fn main() -> Result<()> {
    let cli = cadence::cli::Cli::parse();
    init_tracing(cli.log_filter.clone())?;

    let config = cadence::config::from_cli(&cli)?;
    tracing::debug!(
        api_url = config.api_url(),
        data_dir = %config.data_dir().display(),
        "resolved configuration"
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let engine = cadence::commands::connect(&config)?;
        cadence::commands::execute(&engine, cli.command, std::io::stdout(), std::io::stderr())
            .await
    })
}

fn init_tracing(filter: Option<String>) -> Result<()> {
    let filter = filter.unwrap_or_else(|| "warn".to_string());
    let directive: Directive = filter.parse()?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
    Ok(())
}
