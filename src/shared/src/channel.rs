use crate::protocol::{Action, Broadcast, Message};
use anyhow::{Context, Result, bail};
use autodark_misc::fs::{MODE_SHARED_DIR, create_dir_if_missing};
use log::{debug, warn};
use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};
use nix::unistd::Uid;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strum_macros::AsRefStr;
use uds::{UnixSeqpacketConn, UnixSeqpacketListener};

/// Signature-level permission pair guarding both ends of every broadcast.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, AsRefStr)]
pub enum Permission {
    #[strum(serialize = "me.ranko0p.permission.SEND_DARK_BROADCAST")]
    SendDarkBroadcast,
    #[strum(serialize = "me.ranko0p.permission.RECEIVE_DARK_BROADCAST")]
    ReceiveDarkBroadcast,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionPolicy {
    holders: HashMap<Permission, HashSet<Uid>>,
}

impl PermissionPolicy {
    /// Grants both permissions to every uid, the way a signature permission is granted to all
    /// packages sharing a certificate.
    pub fn signature(uids: impl IntoIterator<Item = Uid>) -> Self {
        let mut policy = Self::default();

        for uid in uids {
            policy.grant(Permission::SendDarkBroadcast, uid);
            policy.grant(Permission::ReceiveDarkBroadcast, uid);
        }

        policy
    }

    pub fn grant(&mut self, permission: Permission, uid: Uid) {
        self.holders.entry(permission).or_default().insert(uid);
    }

    pub fn holds(&self, permission: Permission, uid: Uid) -> bool {
        self.holders
            .get(&permission)
            .is_some_and(|uids| uids.contains(&uid))
    }

    pub fn check(&self, permission: Permission, uid: Uid) -> Result<()> {
        if !self.holds(permission, uid) {
            bail!("uid {uid} does not hold {}", permission.as_ref())
        }
        Ok(())
    }
}

pub trait BroadcastSender: Send + Sync {
    /// Delivers `broadcast` to the package it names. The receiving process must hold
    /// `permission`.
    fn send(&self, broadcast: &Broadcast, permission: Permission) -> Result<()>;

    fn send_message(&self, message: Message, package: &str, permission: Permission) -> Result<()> {
        self.send(&message.into_broadcast(package), permission)
    }
}

/// Maps a package to the seqpacket socket its receiver listens on.
#[derive(Debug, Clone)]
pub struct Router {
    socket_dir: PathBuf,
}

impl Router {
    pub fn new<P: Into<PathBuf>>(socket_dir: P) -> Self {
        Self {
            socket_dir: socket_dir.into(),
        }
    }

    pub fn socket_dir(&self) -> &Path {
        &self.socket_dir
    }

    pub fn socket_path(&self, package: &str) -> PathBuf {
        self.socket_dir.join(format!("{package}.sock"))
    }
}

/// Largest payload a frame may announce. Lists above the inline ceiling travel through the
/// list file, so a real broadcast stays far below this.
pub const MAX_FRAME_SIZE: usize = 1 << 20;

fn peer_uid<C: AsRawFd>(conn: &C) -> Result<Uid> {
    let fd = unsafe { BorrowedFd::borrow_raw(conn.as_raw_fd()) };
    let creds = getsockopt(&fd, PeerCredentials)?;
    Ok(Uid::from_raw(creds.uid()))
}

fn write_frame(conn: &UnixSeqpacketConn, broadcast: &Broadcast) -> Result<()> {
    let data = wincode::serialize(broadcast)?;
    if data.len() > MAX_FRAME_SIZE {
        bail!("frame too large: {} bytes", data.len())
    }

    let len = data.len() as u64;

    conn.send(bytemuck::bytes_of(&len))?;
    let sent = conn.send(&data)?;

    if sent != data.len() {
        bail!("short write: {sent} of {} bytes", data.len())
    }

    Ok(())
}

fn read_frame(conn: &UnixSeqpacketConn) -> Result<Broadcast> {
    let mut header = [0u8; size_of::<u64>()];

    let received = conn.recv(&mut header)?;
    if received == 0 {
        bail!("connection closed without a frame");
    }

    if received != header.len() {
        bail!(
            "incomplete frame header: expected {} bytes, got {received}",
            header.len()
        );
    }

    let len: u64 = bytemuck::pod_read_unaligned(&header);
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .with_context(|| format!("announced frame too large: {len} bytes"))?;

    // one spare byte so an oversized record shows up as a length mismatch
    let capacity = len.checked_add(1).context("frame length overflow")?;
    let mut buffer: Vec<u8> = vec![0; capacity];
    let received = conn.recv(&mut buffer)?;

    if received != len {
        bail!("incomplete frame: expected {len} bytes, got {received}");
    }

    Ok(wincode::deserialize(&buffer[..len])?)
}

pub struct SocketChannel {
    router: Router,
    policy: Arc<PermissionPolicy>,
}

impl SocketChannel {
    pub fn new(router: Router, policy: Arc<PermissionPolicy>) -> Self {
        Self { router, policy }
    }
}

impl BroadcastSender for SocketChannel {
    fn send(&self, broadcast: &Broadcast, permission: Permission) -> Result<()> {
        let path = self.router.socket_path(&broadcast.package);

        let conn = UnixSeqpacketConn::connect(&path)
            .with_context(|| format!("no receiver registered for {}", broadcast.package))?;

        let receiver = peer_uid(&conn)?;
        self.policy
            .check(permission, receiver)
            .with_context(|| format!("refusing to deliver {}", broadcast.action.as_ref()))?;

        write_frame(&conn, broadcast)?;

        debug!(
            "sent {} to {} (uid {receiver})",
            broadcast.action.as_ref(),
            broadcast.package
        );

        Ok(())
    }
}

/// A registered receiver: one listening socket per package, filtered by action and gated by
/// the permission every sender must hold.
pub struct BroadcastReceiver {
    listener: UnixSeqpacketListener,
    path: PathBuf,
    package: String,
    actions: HashSet<Action>,
    required: Permission,
    policy: Arc<PermissionPolicy>,
}

impl BroadcastReceiver {
    pub fn register(
        router: &Router,
        package: &str,
        actions: impl IntoIterator<Item = Action>,
        required: Permission,
        policy: Arc<PermissionPolicy>,
    ) -> Result<Self> {
        let path = router.socket_path(package);
        create_dir_if_missing(router.socket_dir(), MODE_SHARED_DIR)?;

        if path.exists() {
            if UnixSeqpacketConn::connect(&path).is_ok() {
                bail!("{package} already registered at {}", path.display());
            }

            debug!("removing stale socket {}", path.display());
            fs::remove_file(&path)?;
        }

        let listener = UnixSeqpacketListener::bind(&path)
            .with_context(|| format!("failed to bind {}", path.display()))?;

        // access is decided by peer credentials, not by file mode
        autodark_misc::fs::chmod(&path, 0o666)?;

        Ok(Self {
            listener,
            path,
            package: package.into(),
            actions: actions.into_iter().collect(),
            required,
            policy,
        })
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Blocks until a broadcast passes every filter.
    pub fn recv(&self) -> Result<Broadcast> {
        loop {
            if let Some(broadcast) = self.accept_one()? {
                return Ok(broadcast);
            }
        }
    }

    /// Accepts one connection; `None` when the broadcast was filtered out or the connection
    /// failed on its own. Only a broken listener is an error.
    pub fn accept_one(&self) -> Result<Option<Broadcast>> {
        let conn = match self.listener.accept_unix_addr() {
            Ok((conn, _)) => conn,
            Err(err) => match accept_failure(&err) {
                AcceptFailure::Connection => {
                    warn!("dropping connection: {err}");
                    return Ok(None);
                }
                AcceptFailure::Exhausted => {
                    warn!("out of resources while accepting: {err}");
                    thread::sleep(EXHAUSTED_BACKOFF);
                    return Ok(None);
                }
                AcceptFailure::Listener => {
                    return Err(err).context(format!("listener for {} failed", self.package));
                }
            },
        };

        let sender = match peer_uid(&conn) {
            Ok(uid) => uid,
            Err(err) => {
                warn!("dropping connection without credentials: {err:?}");
                return Ok(None);
            }
        };

        if !self.policy.holds(self.required, sender) {
            warn!(
                "dropping broadcast from uid {sender}: missing {}",
                self.required.as_ref()
            );
            return Ok(None);
        }

        let broadcast = match read_frame(&conn) {
            Ok(broadcast) => broadcast,
            Err(err) => {
                warn!("dropping malformed broadcast from uid {sender}: {err:?}");
                return Ok(None);
            }
        };

        if broadcast.package != self.package {
            warn!(
                "dropping {} addressed to {}, this is {}",
                broadcast.action.as_ref(),
                broadcast.package,
                self.package
            );
            return Ok(None);
        }

        if !self.actions.contains(&broadcast.action) {
            debug!("ignoring unregistered action {}", broadcast.action.as_ref());
            return Ok(None);
        }

        Ok(Some(broadcast))
    }
}

const EXHAUSTED_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AcceptFailure {
    /// Only the pending connection is lost.
    Connection,
    /// The process or system ran out of descriptors or memory, retry later.
    Exhausted,
    Listener,
}

fn accept_failure(err: &io::Error) -> AcceptFailure {
    use nix::libc::{ECONNABORTED, EINTR, EMFILE, ENFILE, ENOBUFS, ENOMEM, EPERM, EPROTO};

    match err.raw_os_error() {
        Some(EINTR | ECONNABORTED | EPROTO | EPERM) => AcceptFailure::Connection,
        Some(EMFILE | ENFILE | ENOBUFS | ENOMEM) => AcceptFailure::Exhausted,
        _ if err.kind() == io::ErrorKind::Interrupted => AcceptFailure::Connection,
        _ => AcceptFailure::Listener,
    }
}

impl Drop for BroadcastReceiver {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            debug!("failed to remove {}: {err}", self.path.display());
        }
    }
}
