use anyhow::{Context, Result, anyhow, bail};
use autodark_misc::fs::{MODE_SHARED_DIR, create_dir_if_missing};
use autodark_server::ports::{NightMode, NightModeSource, SharedNightMode};
use autodark_server::{HostPorts, ServerModule};
use autodark_shared::settings::Settings;
use daemonize::Daemonize;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::{task, time};

const PID_FILE: &str = "autodark.pid";

pub fn daemonize(settings: &Settings) -> Result<()> {
    create_dir_if_missing(&settings.socket_dir, MODE_SHARED_DIR)?;

    Daemonize::new()
        .pid_file(settings.socket_dir.join(PID_FILE))
        .working_directory(&settings.socket_dir)
        .start()?;

    Ok(())
}

/// Output of `settings get secure ui_night_mode`, `null` when never set.
pub fn parse_night_mode(output: &str) -> Option<NightMode> {
    output
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(NightMode::from_raw)
}

async fn read_night_mode() -> Result<NightMode> {
    let output = Command::new("settings")
        .args(["get", "secure", "ui_night_mode"])
        .output()
        .await
        .context("failed to run settings")?;

    if !output.status.success() {
        bail!("settings exited with {}", output.status);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_night_mode(&stdout).ok_or_else(|| anyhow!("unexpected night mode: {}", stdout.trim()))
}

async fn poll_night_mode(night: Arc<SharedNightMode>, period: Duration) {
    let mut interval = time::interval(period);

    loop {
        interval.tick().await;

        match read_night_mode().await {
            Ok(mode) => {
                if mode != night.night_mode() {
                    info!("night mode changed to {mode:?}");
                    night.set(mode);
                }
            }
            Err(err) => debug!("keeping {:?}: {err:?}", night.night_mode()),
        }
    }
}

/// Runs the module in its own process. Launches are reported by `NEW_ACTIVITY` broadcasts
/// instead of runtime hooks.
pub async fn serve(settings: Settings) -> Result<()> {
    let initial = match read_night_mode().await {
        Ok(mode) => mode,
        Err(err) => {
            warn!("night mode unknown, assuming auto: {err:?}");
            NightMode::Auto
        }
    };

    let night = Arc::new(SharedNightMode::new(initial));
    let ports = HostPorts::system(&settings, night.clone());

    let module = ServerModule::attach(&settings, ports, None)?;
    let receiver = module.register_receiver()?;

    let period = Duration::from_secs(settings.night_mode_poll_secs.max(1));
    let poller = task::spawn(poll_night_mode(night, period));

    info!(
        "serving as {} with {} blocked packages",
        settings.host_package,
        module.authority().len()
    );

    let joined = task::spawn_blocking(move || receiver.join()).await;
    poller.abort();

    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => bail!("receiver thread panicked"),
        Err(err) => bail!("failed to join receiver: {err}"),
    }
}
