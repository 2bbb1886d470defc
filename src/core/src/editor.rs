use anyhow::{Context, Result, bail};
use autodark_shared::channel::{BroadcastSender, Permission};
use autodark_shared::protocol::{LoadStatus, Message};
use autodark_shared::store::PersistentListStore;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

impl SyncState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncState::Succeeded | SyncState::Failed)
    }
}

pub fn validate_package(name: &str) -> Result<()> {
    let bytes = name.as_bytes();

    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        bail!("empty package name");
    };

    if bytes.len() <= 4 {
        bail!("package name too short: {name}");
    }

    if !first.is_ascii_alphabetic() || !last.is_ascii_alphabetic() {
        bail!("package name must start and end with a letter: {name}");
    }

    if let Some(invalid) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '_'))
    {
        bail!("invalid character {invalid:?} in package name: {name}");
    }

    Ok(())
}

/// The user's edit buffer plus the upload state of its last sync.
pub struct AppSideListEditor {
    store: PersistentListStore,
    sender: Arc<dyn BroadcastSender>,
    host_package: String,
    buffer: BTreeSet<String>,
    state: SyncState,
}

impl AppSideListEditor {
    /// Starts from the persisted list. Only a missing file gives an empty buffer, an existing
    /// one that cannot be read is an error so the next sync cannot overwrite it.
    pub fn open(
        store: PersistentListStore,
        sender: Arc<dyn BroadcastSender>,
        host_package: impl Into<String>,
    ) -> Result<Self> {
        let buffer = if store.exists() {
            store.read().context("refusing to edit an unreadable block list")?
        } else {
            Vec::new()
        };

        Ok(Self {
            store,
            sender,
            host_package: host_package.into(),
            buffer: buffer.into_iter().collect(),
            state: SyncState::Idle,
        })
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `false` when the package was already blocked.
    pub fn add(&mut self, package: &str) -> Result<bool> {
        validate_package(package)?;
        Ok(self.buffer.insert(package.into()))
    }

    pub fn remove(&mut self, package: &str) -> bool {
        self.buffer.remove(package)
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Persists the buffer and asks the host to replace its set. A request while another one
    /// is pending does nothing.
    pub fn request_sync(&mut self) -> Result<()> {
        if self.state == SyncState::Pending {
            debug!("sync already pending");
            return Ok(());
        }

        self.state = SyncState::Pending;

        let result = self.persist_and_send();
        if result.is_err() {
            self.state = SyncState::Failed;
        }

        result
    }

    fn persist_and_send(&self) -> Result<()> {
        self.store
            .write(&self.buffer)
            .context("failed to persist block list")?;

        let list: Vec<String> = self.buffer.iter().cloned().collect();
        info!("syncing {} blocked packages", list.len());

        self.sender
            .send_message(
                Message::reload_list(list),
                &self.host_package,
                Permission::ReceiveDarkBroadcast,
            )
            .context("failed to request block list reload")
    }

    pub fn on_progress(&mut self, status: LoadStatus) {
        if self.state != SyncState::Pending {
            warn!("unexpected {} while {:?}", status.as_ref(), self.state);
            return;
        }

        match status {
            LoadStatus::Start => debug!("host started loading"),
            LoadStatus::Failed => self.state = SyncState::Failed,
            LoadStatus::Succeed => self.state = SyncState::Succeeded,
        }
    }

    /// Gives up on the pending request.
    pub fn on_timeout(&mut self) {
        if self.state == SyncState::Pending {
            warn!("no acknowledgement from {}", self.host_package);
            self.state = SyncState::Failed;
        }
    }

    /// Terminal states are reported once, then the editor is idle again.
    pub fn take_state(&mut self) -> SyncState {
        let state = self.state;

        if state.is_terminal() {
            self.state = SyncState::Idle;
        }

        state
    }
}

/// Pushes the persisted list again after boot or a scheduled alarm. Returns `false` when
/// there was nothing to push.
pub fn resync(
    store: &PersistentListStore,
    sender: &dyn BroadcastSender,
    host_package: &str,
) -> Result<bool> {
    if !store.exists() {
        debug!("no block list to resync");
        return Ok(false);
    }

    let list = store.read()?;
    if list.is_empty() {
        return Ok(false);
    }

    sender.send_message(
        Message::reload_list(list),
        host_package,
        Permission::ReceiveDarkBroadcast,
    )?;

    Ok(true)
}
