use crate::channel::{PermissionPolicy, Router};
use crate::store::PersistentListStore;
use anyhow::{Context, Result};
use autodark_misc::props;
use nix::unistd::{Gid, Uid, geteuid};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const SYSTEM_PROP_FORCE_DARK: &str = "debug.hwui.force_dark";
pub const SYSTEM_PROP_HOOK_INPUT_METHOD: &str = "debug.hwui.hook_ime";

const BLOCK_LIST_FILE: &str = "block.txt";
const IME_FLAG_FILE: &str = "blockIME";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_package: String,
    pub host_package: String,
    /// Device-encrypted storage, readable before the user unlocks.
    pub data_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub list_group: u32,
    pub permission_holders: Vec<u32>,
    pub night_mode_poll_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_package: "me.ranko.autodark".into(),
            host_package: "android".into(),
            data_dir: "/data/user_de/0/me.ranko.autodark".into(),
            socket_dir: "/dev/socket/autodark".into(),
            list_group: 1000,
            permission_holders: vec![0, 1000],
            night_mode_poll_secs: 5,
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

        toml::from_str(&text).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn block_list_path(&self) -> PathBuf {
        self.data_dir.join(BLOCK_LIST_FILE)
    }

    pub fn ime_flag_path(&self) -> PathBuf {
        self.data_dir.join(IME_FLAG_FILE)
    }

    pub fn store(&self) -> PersistentListStore {
        PersistentListStore::new(self.block_list_path(), Some(Gid::from_raw(self.list_group)))
    }

    pub fn router(&self) -> Router {
        Router::new(&self.socket_dir)
    }

    /// Configured holders plus the calling process itself.
    pub fn policy(&self) -> PermissionPolicy {
        let uids = self
            .permission_holders
            .iter()
            .map(|uid| Uid::from_raw(*uid))
            .chain([geteuid()]);

        PermissionPolicy::signature(uids)
    }

    pub fn ime_hook_enabled(&self) -> bool {
        self.ime_flag_path().exists() || props::get_bool(SYSTEM_PROP_HOOK_INPUT_METHOD, false)
    }
}
