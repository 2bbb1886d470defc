use arc_swap::ArcSwap;
use autodark_shared::store::PersistentListStore;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Canonical block set of the privileged process.
///
/// Readers load the current `Arc` without locking, writers build the next set off to the side
/// and swap it in, so a launch in flight sees either the old or the new set and never a
/// half-filled one.
pub struct BlockListAuthority {
    set: ArcSwap<HashSet<String>>,
    initialized: AtomicBool,
    writer: Mutex<()>,
    load_time: Duration,
}

impl BlockListAuthority {
    /// Seeds the set from the list file. Decisions stay disabled until the first
    /// [Self::replace_all], whatever the file contained.
    pub fn initialize(store: &PersistentListStore) -> Self {
        let start = Instant::now();

        let set: HashSet<String> = match store.read() {
            Ok(entries) => entries.into_iter().collect(),
            Err(err) => {
                warn!("starting with an empty block list: {err:?}");
                HashSet::new()
            }
        };

        let load_time = start.elapsed();
        info!("loaded {} blocked packages in {load_time:.2?}", set.len());

        Self {
            set: ArcSwap::from_pointee(set),
            initialized: AtomicBool::new(false),
            writer: Mutex::new(()),
            load_time,
        }
    }

    pub fn empty() -> Self {
        Self {
            set: ArcSwap::from_pointee(HashSet::new()),
            initialized: AtomicBool::new(false),
            writer: Mutex::new(()),
            load_time: Duration::ZERO,
        }
    }

    pub fn replace_all<I, S>(&self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: HashSet<String> = entries.into_iter().map(Into::into).collect();
        let size = next.len();

        {
            let _guard = self.writer.lock();
            self.set.store(Arc::new(next));
        }

        if !self.initialized.swap(true, Ordering::AcqRel) {
            info!("block list initialized, size: {size}");
        }
    }

    pub fn contains(&self, package: &str) -> bool {
        self.set.load().contains(package)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Arc<HashSet<String>> {
        self.set.load_full()
    }

    pub fn len(&self) -> usize {
        self.set.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dump(&self) {
        let snapshot = self.snapshot();
        let mut entries: Vec<_> = snapshot.iter().collect();
        entries.sort();

        info!(
            "block list: size: {}, initialized: {}, restored in {:.2?}",
            entries.len(),
            self.is_initialized(),
            self.load_time
        );
        for (index, entry) in entries.iter().enumerate() {
            info!("{index} : {entry}");
        }
    }
}
