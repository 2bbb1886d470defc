use crate::cli::Cli;
use anyhow::Result;
use autodark_shared::settings::Settings;
use log::debug;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/data/adb/autodark/autodark.toml";

/// Settings file, falling back to the well-known path, then to defaults; CLI flags win.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Settings::load(DEFAULT_CONFIG_PATH)?,
        None => Settings::default(),
    };

    if let Some(dir) = &cli.data_dir {
        settings.data_dir = dir.clone();
    }

    if let Some(dir) = &cli.socket_dir {
        settings.socket_dir = dir.clone();
    }

    debug!("{settings:?}");
    Ok(settings)
}

pub fn wait_limit(cli: &Cli) -> Option<Duration> {
    cli.timeout_ms.map(Duration::from_millis)
}
