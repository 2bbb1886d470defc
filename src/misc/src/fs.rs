use anyhow::{Context, Result};
use log::debug;
use nix::unistd::{Gid, chown};
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

pub const MODE_SHARED_FILE: u32 = 0o770; // rwxrwx---
pub const MODE_SHARED_DIR: u32 = 0o771; // rwxrwx--x

pub fn chmod<P: AsRef<Path>>(path: P, mode: u32) -> Result<()> {
    let path = path.as_ref();
    fs::set_permissions(path, Permissions::from_mode(mode))
        .with_context(|| format!("chmod {mode:o} {}", path.display()))
}

pub fn chgrp<P: AsRef<Path>>(path: P, gid: Gid) -> Result<()> {
    let path = path.as_ref();
    chown(path, None, Some(gid)).with_context(|| format!("chgrp {gid} {}", path.display()))
}

/// Creates `dir` with `mode` when missing, returns `true` if it was created.
pub fn create_dir_if_missing<P: AsRef<Path>>(dir: P, mode: u32) -> Result<bool> {
    let dir = dir.as_ref();

    if dir.is_dir() {
        return Ok(false);
    }

    fs::create_dir_all(dir).with_context(|| format!("mkdir {}", dir.display()))?;
    chmod(dir, mode)?;

    Ok(true)
}

/// Replaces `path` with `content` through a sibling temp file and `rename(2)`, so a reader in
/// another process sees either the old or the new file. Mode and group are applied before the
/// rename.
pub fn write_shared<P: AsRef<Path>>(
    path: P,
    content: &[u8],
    mode: u32,
    group: Option<Gid>,
) -> Result<()> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .with_context(|| format!("not a file path: {}", path.display()))?;

    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    {
        let mut file: File = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp)
            .with_context(|| format!("open {}", tmp.display()))?;

        file.write_all(content)?;
        file.sync_all()?;
    }

    // umask may have stripped group bits at creation
    chmod(&tmp, mode)?;

    if let Some(gid) = group {
        chgrp(&tmp, gid)?;
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;

    debug!("wrote {} bytes to {}", content.len(), path.display());

    Ok(())
}
