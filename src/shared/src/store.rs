use anyhow::{Context, Result};
use autodark_misc::ext::ResultExt;
use autodark_misc::fs::{MODE_SHARED_DIR, MODE_SHARED_FILE, create_dir_if_missing, write_shared};
use log::debug;
use nix::unistd::Gid;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// The block list as both processes see it on disk: one package name per line.
#[derive(Debug, Clone)]
pub struct PersistentListStore {
    path: PathBuf,
    group: Option<Gid>,
}

impl PersistentListStore {
    pub fn new<P: Into<PathBuf>>(path: P, group: Option<Gid>) -> Self {
        Self {
            path: path.into(),
            group,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn read(&self) -> Result<Vec<String>> {
        self.read_with_capacity(0)
    }

    /// Reads every non-blank line; `capacity` is a hint from a size-only reload request.
    pub fn read_with_capacity(&self, capacity: usize) -> Result<Vec<String>> {
        let file = File::open(&self.path)
            .with_context(|| format!("block list not readable: {}", self.path.display()))?;

        let mut entries = Vec::with_capacity(capacity);

        for line in BufReader::new(file).lines() {
            let line = line?;
            let entry = line.trim();

            if !entry.is_empty() {
                entries.push(entry.to_string());
            }
        }

        debug!("read {} entries from {}", entries.len(), self.path.display());

        Ok(entries)
    }

    /// Like [Self::read] but a missing or unreadable file yields `None` instead of an error.
    pub fn read_or_warn(&self) -> Option<Vec<String>> {
        self.read().ok_or_warn()
    }

    pub fn write<I, S>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(parent) = self.path.parent() {
            create_dir_if_missing(parent, MODE_SHARED_DIR)?;
        }

        let mut content = String::new();
        for entry in entries {
            content.push_str(entry.as_ref());
            content.push('\n');
        }

        write_shared(&self.path, content.as_bytes(), MODE_SHARED_FILE, self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn write_then_read_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentListStore::new(dir.path().join("block.txt"), None);

        store.write(["com.example.a", "com.example.b"]).unwrap();

        assert_eq!(store.read().unwrap(), ["com.example.a", "com.example.b"]);
        assert_eq!(
            fs::metadata(store.path()).unwrap().mode() & 0o777,
            MODE_SHARED_FILE
        );
    }

    #[test]
    fn blank_lines_and_padding_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block.txt");
        fs::write(&path, "\n  com.a  \n\ncom.b\r\n").unwrap();

        let store = PersistentListStore::new(path, None);

        assert_eq!(store.read().unwrap(), ["com.a", "com.b"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentListStore::new(dir.path().join("absent.txt"), None);

        assert!(!store.exists());
        assert!(store.read().is_err());
        assert!(store.read_or_warn().is_none());
    }

    #[test]
    fn write_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentListStore::new(dir.path().join("data/block.txt"), None);

        store.write(Vec::<String>::new()).unwrap();

        assert!(store.exists());
        assert!(store.read().unwrap().is_empty());
    }
}
