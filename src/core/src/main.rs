mod cli;
mod client;
mod config;
mod daemon;
mod editor;
mod misc;

use crate::cli::{Cli, Command};
use crate::client::AppClient;
use crate::editor::{AppSideListEditor, SyncState};
use crate::misc::install_panic_hook;
use anyhow::{Result, bail};
use autodark_shared::protocol::Message;
use autodark_shared::settings::Settings;
use log::{LevelFilter, info, warn};
use std::time::Duration;
use tokio::runtime::Builder;

fn init_logger() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    };

    #[cfg(target_os = "android")]
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(level)
            .with_tag("autodark::core"),
    );

    #[cfg(not(target_os = "android"))]
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    init_logger();

    let args = Cli::parse_args();
    let settings = config::load_settings(&args)?;

    if let Command::Serve { daemon: true } = args.command {
        daemon::daemonize(&settings)?;
    }

    let runtime = Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async_main(args, settings));

    // a receiver still blocked in accept must not hold the process
    runtime.shutdown_background();

    result
}

async fn async_main(args: Cli, settings: Settings) -> Result<()> {
    install_panic_hook();

    let wait_limit = config::wait_limit(&args);

    match args.command {
        Command::List => {
            for entry in settings.store().read_or_warn().unwrap_or_default() {
                println!("{entry}");
            }
        }
        Command::Add { packages } => {
            edit_and_sync(&settings, wait_limit, |editor| {
                for package in &packages {
                    if !editor.add(package)? {
                        info!("{package} is already blocked");
                    }
                }
                Ok(())
            })
            .await?
        }
        Command::Remove { packages } => {
            edit_and_sync(&settings, wait_limit, |editor| {
                for package in &packages {
                    if !editor.remove(package) {
                        warn!("{package} is not blocked");
                    }
                }
                Ok(())
            })
            .await?
        }
        Command::Sync => edit_and_sync(&settings, wait_limit, |_| Ok(())).await?,
        Command::Resync => {
            let client = AppClient::connect(&settings, wait_limit)?;
            let pushed =
                editor::resync(&settings.store(), client.channel().as_ref(), &settings.host_package)?;
            info!("resync: {}", if pushed { "pushed" } else { "nothing to push" });
        }
        Command::Probe => {
            let client = AppClient::connect(&settings, wait_limit)?;
            if !client.probe().await? {
                bail!("host module did not answer");
            }
            println!("alive");
        }
        Command::Ime { package } => {
            AppClient::connect(&settings, wait_limit)?.send(Message::ImeUpdate(package))?
        }
        Command::Activity { package } => {
            AppClient::connect(&settings, wait_limit)?.send(Message::new_activity(package))?
        }
        Command::Dump => AppClient::connect(&settings, wait_limit)?.send(Message::DumpList)?,
        Command::Shutdown => AppClient::connect(&settings, wait_limit)?.send(Message::Shutdown)?,
        Command::Serve { .. } => daemon::serve(settings).await?,
    }

    Ok(())
}

async fn edit_and_sync<F>(settings: &Settings, wait_limit: Option<Duration>, edit: F) -> Result<()>
where
    F: FnOnce(&mut AppSideListEditor) -> Result<()>,
{
    let client = AppClient::connect(settings, wait_limit)?;
    let mut editor =
        AppSideListEditor::open(settings.store(), client.channel(), &settings.host_package)?;

    edit(&mut editor)?;
    editor.request_sync()?;

    match client.wait_for_sync(&mut editor).await? {
        SyncState::Succeeded => {
            info!("block list synced, {} packages", editor.len());
            Ok(())
        }
        state => bail!("block list sync ended as {state:?}"),
    }
}
