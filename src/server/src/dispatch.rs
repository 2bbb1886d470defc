use anyhow::{Result, anyhow};
use autodark_misc::ext::ResultExt;
use autodark_shared::channel::{BroadcastSender, Permission};
use autodark_shared::protocol::Broadcast;
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, UnboundedSender};

/// Hands broadcasts to a worker thread so hook callbacks return without touching a socket.
pub struct QueuedSender {
    tx: UnboundedSender<(Broadcast, Permission)>,
}

impl QueuedSender {
    pub fn spawn(inner: Arc<dyn BroadcastSender>) -> Result<(Self, JoinHandle<()>)> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Broadcast, Permission)>();

        let worker = thread::Builder::new()
            .name("autodark-send".into())
            .spawn(move || {
                while let Some((broadcast, permission)) = rx.blocking_recv() {
                    inner.send(&broadcast, permission).log_if_error();
                }
                debug!("broadcast queue closed");
            })?;

        Ok((Self { tx }, worker))
    }
}

impl BroadcastSender for QueuedSender {
    fn send(&self, broadcast: &Broadcast, permission: Permission) -> Result<()> {
        self.tx
            .send((broadcast.clone(), permission))
            .map_err(|_| anyhow!("broadcast queue closed"))
    }
}
