use crate::editor::{AppSideListEditor, SyncState};
use anyhow::{Context, Result, anyhow};
use autodark_shared::channel::{BroadcastReceiver, BroadcastSender, Permission, SocketChannel};
use autodark_shared::protocol::{Action, Message};
use autodark_shared::settings::Settings;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::{task, time};

/// The app process end of the channel: sends to the host and listens for its answers.
pub struct AppClient {
    settings: Settings,
    channel: Arc<SocketChannel>,
    receiver: Arc<BroadcastReceiver>,
    wait_limit: Option<Duration>,
}

impl AppClient {
    pub fn connect(settings: &Settings, wait_limit: Option<Duration>) -> Result<Self> {
        let policy = Arc::new(settings.policy());

        // registered before anything is sent so no answer can get lost
        let receiver = BroadcastReceiver::register(
            &settings.router(),
            &settings.app_package,
            [Action::ReloadResult, Action::AliveAck],
            Permission::SendDarkBroadcast,
            policy.clone(),
        )?;

        Ok(Self {
            settings: settings.clone(),
            channel: Arc::new(SocketChannel::new(settings.router(), policy)),
            receiver: Arc::new(receiver),
            wait_limit,
        })
    }

    pub fn channel(&self) -> Arc<SocketChannel> {
        self.channel.clone()
    }

    pub fn send(&self, message: Message) -> Result<()> {
        self.channel.send_message(
            message,
            &self.settings.host_package,
            Permission::ReceiveDarkBroadcast,
        )
    }

    async fn next(&self) -> Result<Message> {
        let receiver = self.receiver.clone();
        let broadcast = task::spawn_blocking(move || receiver.recv())
            .await
            .map_err(|err| anyhow!("receiver task failed: {err}"))??;

        Message::try_from(broadcast)
    }

    /// Feeds acknowledgements to the editor until its request is settled, then reports the
    /// settled state once.
    pub async fn wait_for_sync(&self, editor: &mut AppSideListEditor) -> Result<SyncState> {
        let settle = async {
            while editor.state() == SyncState::Pending {
                match self.next().await? {
                    Message::ReloadResult(status) => {
                        debug!("host reported {}", status.as_ref());
                        editor.on_progress(status);
                    }
                    other => debug!("ignoring {}", other.action().as_ref()),
                }
            }
            anyhow::Ok(())
        };

        match self.wait_limit {
            Some(limit) => match time::timeout(limit, settle).await {
                Ok(result) => result?,
                Err(_) => editor.on_timeout(),
            },
            None => settle.await?,
        }

        Ok(editor.take_state())
    }

    pub async fn probe(&self) -> Result<bool> {
        self.send(Message::Alive).context("host module not reachable")?;

        let ack = async {
            loop {
                if self.next().await? == Message::AliveAck {
                    return anyhow::Ok(());
                }
            }
        };

        match self.wait_limit {
            Some(limit) => match time::timeout(limit, ack).await {
                Ok(result) => result.map(|_| true),
                Err(_) => {
                    warn!("no liveness acknowledgement within {limit:?}");
                    Ok(false)
                }
            },
            None => ack.await.map(|_| true),
        }
    }
}
