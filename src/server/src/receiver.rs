use crate::authority::BlockListAuthority;
use crate::engine::ForceDarkEngine;
use anyhow::{Context, Result, bail};
use autodark_misc::debug_on;
use autodark_shared::channel::{BroadcastReceiver, BroadcastSender, Permission};
use autodark_shared::protocol::{Action, BROADCAST_MAX_SIZE, LoadStatus, Message, now_millis};
use autodark_shared::store::PersistentListStore;
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Privileged-side end of the sync protocol. One instance serves every request, so list
/// replacements are applied in the order they arrive.
pub struct BlockListReceiver {
    authority: Arc<BlockListAuthority>,
    engine: Arc<ForceDarkEngine>,
    store: PersistentListStore,
    sender: Arc<dyn BroadcastSender>,
    app_package: String,
    hook_ime: bool,
}

impl BlockListReceiver {
    pub fn new(
        engine: Arc<ForceDarkEngine>,
        store: PersistentListStore,
        sender: Arc<dyn BroadcastSender>,
        app_package: impl Into<String>,
        hook_ime: bool,
    ) -> Self {
        Self {
            authority: engine.authority().clone(),
            engine,
            store,
            sender,
            app_package: app_package.into(),
            hook_ime,
        }
    }

    pub fn actions(&self) -> Vec<Action> {
        let mut actions = vec![
            Action::NewActivity,
            Action::ReloadList,
            Action::Alive,
            Action::DumpList,
            Action::Shutdown,
        ];

        if self.hook_ime {
            actions.push(Action::ImeUpdate);
        }

        actions
    }

    fn report(&self, message: Message) -> Result<()> {
        self.sender
            .send_message(message, &self.app_package, Permission::ReceiveDarkBroadcast)
    }

    fn report_status(&self, status: LoadStatus) -> bool {
        match self.report(Message::ReloadResult(status)) {
            Ok(()) => true,
            Err(err) => {
                error!("failed to report {}: {err:?}", status.as_ref());
                false
            }
        }
    }

    fn load_list(&self, size: usize, list: Option<Vec<String>>) -> Result<Vec<String>> {
        if !self.store.exists() {
            bail!("block list file missing: {}", self.store.path().display());
        }

        if size <= BROADCAST_MAX_SIZE {
            return list.context("inline list missing");
        }

        self.store.read_with_capacity(size)
    }

    fn on_reload(&self, start_time: u64, size: usize, list: Option<Vec<String>>) {
        if !self.report_status(LoadStatus::Start) {
            return;
        }

        debug!("reload: size: {size}, large list: {}", size > BROADCAST_MAX_SIZE);

        match self.load_list(size, list) {
            Ok(entries) => {
                if entries.len() != size {
                    warn!("reload: announced {size} entries, got {}", entries.len());
                }

                self.authority.replace_all(entries);
                self.report_status(LoadStatus::Succeed);
            }
            Err(err) => {
                error!("reload: unable to read block list: {err:?}");
                self.report_status(LoadStatus::Failed);
            }
        }

        trace!("reload: total time: {}ms", now_millis().saturating_sub(start_time));

        if debug_on!("list") {
            self.authority.dump();
        }
    }

    pub fn on_receive(&self, message: Message) -> Flow {
        let action = message.action();
        trace!("received {}", action.as_ref());

        match message {
            Message::NewActivity {
                start_time,
                package,
            } => {
                self.engine.evaluate(&package);
                trace!(
                    "{package}: evaluated in {}ms",
                    now_millis().saturating_sub(start_time)
                );
            }
            Message::ReloadList {
                start_time,
                size,
                list,
            } => self.on_reload(start_time, size, list),
            Message::ImeUpdate(package) => {
                if self.hook_ime {
                    self.engine.evaluate(&package);
                }
            }
            Message::Alive => {
                if let Err(err) = self.report(Message::AliveAck) {
                    warn!("failed to answer liveness probe: {err:?}");
                }
            }
            Message::DumpList => self.authority.dump(),
            Message::Shutdown => {
                info!("shutdown requested");
                return Flow::Stop;
            }
            Message::ReloadResult(_) | Message::AliveAck => {
                debug!("ignoring app-bound {}", action.as_ref());
            }
        }

        Flow::Continue
    }

    pub fn spawn(self, receiver: BroadcastReceiver) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("autodark-recv".into())
            .spawn(move || {
                info!("listening as {}", receiver.package());

                loop {
                    // per-connection failures are skipped inside recv
                    let broadcast = match receiver.recv() {
                        Ok(broadcast) => broadcast,
                        Err(err) => {
                            error!("receiver stopped: {err:?}");
                            break;
                        }
                    };

                    let message = match Message::try_from(broadcast) {
                        Ok(message) => message,
                        Err(err) => {
                            warn!("dropping broadcast: {err:?}");
                            continue;
                        }
                    };

                    if self.on_receive(message) == Flow::Stop {
                        break;
                    }
                }
            })?;

        Ok(handle)
    }
}
