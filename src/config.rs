pub use cadence_core::config::*;

use crate::cli::Cli;

/// Resolve the config for one invocation; command-line flags win over the environment.
pub fn from_cli(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::discover(cli.data_dir.clone())?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url);
    }
    if cli.token.is_some() {
        config = config.with_token(cli.token.clone());
    }
    Ok(config)
}
