pub mod authority;
pub mod dispatch;
pub mod engine;
pub mod hooks;
pub mod ports;
pub mod receiver;

use crate::authority::BlockListAuthority;
use crate::engine::ForceDarkEngine;
use crate::hooks::activity::ActivityLaunchInterceptor;
use crate::hooks::{EventSource, LaunchAdapter, LaunchCallback, RawLaunchEvent};
use crate::ports::{ForceDarkPort, NightModeSource, SystemPropertyFlag};
use crate::receiver::BlockListReceiver;
use anyhow::Result;
use autodark_shared::channel::{BroadcastReceiver, BroadcastSender, Permission, SocketChannel};
use autodark_shared::settings::Settings;
use log::{LevelFilter, info};
use std::sync::Arc;
use std::thread::JoinHandle;

pub fn init_logger() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    #[cfg(target_os = "android")]
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(level)
            .with_tag("autodark::server"),
    );

    #[cfg(not(target_os = "android"))]
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

/// What the host process provides to the module.
pub struct HostPorts {
    pub flag: Arc<dyn ForceDarkPort>,
    pub night: Arc<dyn NightModeSource>,
    pub sender: Arc<dyn BroadcastSender>,
}

impl HostPorts {
    /// The system property flag and the socket channel described by `settings`.
    pub fn system(settings: &Settings, night: Arc<dyn NightModeSource>) -> Self {
        Self {
            flag: Arc::new(SystemPropertyFlag),
            night,
            sender: Arc::new(SocketChannel::new(
                settings.router(),
                Arc::new(settings.policy()),
            )),
        }
    }
}

/// Everything attached to the privileged process, owned for the lifetime of that process.
pub struct ServerModule {
    settings: Settings,
    engine: Arc<ForceDarkEngine>,
    sender: Arc<dyn BroadcastSender>,
}

impl ServerModule {
    /// Restores the block list before any hook goes in, so the first launch already sees it.
    pub fn attach(
        settings: &Settings,
        ports: HostPorts,
        source: Option<&dyn EventSource>,
    ) -> Result<Self> {
        let authority = Arc::new(BlockListAuthority::initialize(&settings.store()));
        let engine = Arc::new(ForceDarkEngine::new(authority, ports.night, ports.flag));

        if let Some(source) = source {
            let adapter = LaunchAdapter::for_sdk(source.sdk_int())?;
            let version = adapter.version();
            let interceptor = ActivityLaunchInterceptor::new(adapter, engine.clone());

            let callback: LaunchCallback =
                Box::new(move |raw: &RawLaunchEvent| interceptor.on_launch(raw));

            source.install_launch_hooks(version, callback)?;
            info!("launch hooks installed for {version:?}");
        }

        Ok(Self {
            settings: settings.clone(),
            engine,
            sender: ports.sender,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn authority(&self) -> &Arc<BlockListAuthority> {
        self.engine.authority()
    }

    pub fn engine(&self) -> &Arc<ForceDarkEngine> {
        &self.engine
    }

    pub fn receiver(&self) -> BlockListReceiver {
        BlockListReceiver::new(
            self.engine.clone(),
            self.settings.store(),
            self.sender.clone(),
            &self.settings.app_package,
            self.settings.ime_hook_enabled(),
        )
    }

    /// Listens for app broadcasts on a dedicated thread until a shutdown arrives.
    pub fn register_receiver(&self) -> Result<JoinHandle<()>> {
        let receiver = self.receiver();

        let socket = BroadcastReceiver::register(
            &self.settings.router(),
            &self.settings.host_package,
            receiver.actions(),
            Permission::SendDarkBroadcast,
            Arc::new(self.settings.policy()),
        )?;

        receiver.spawn(socket)
    }
}
