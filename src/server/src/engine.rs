use crate::authority::BlockListAuthority;
use crate::ports::{ForceDarkPort, NightModeSource};
use log::{debug, trace, warn};
use std::sync::Arc;

/// Blocked apps run with force-dark off, everything else with it on. When the membership of
/// the package equals the current flag the flag is wrong for it and has to flip.
///
/// Returns the value to write, `None` to leave the flag alone.
pub fn decide(blocked: bool, current: bool) -> Option<bool> {
    (blocked == current).then_some(!current)
}

pub struct ForceDarkEngine {
    authority: Arc<BlockListAuthority>,
    night: Arc<dyn NightModeSource>,
    flag: Arc<dyn ForceDarkPort>,
}

impl ForceDarkEngine {
    pub fn new(
        authority: Arc<BlockListAuthority>,
        night: Arc<dyn NightModeSource>,
        flag: Arc<dyn ForceDarkPort>,
    ) -> Self {
        Self {
            authority,
            night,
            flag,
        }
    }

    pub fn authority(&self) -> &Arc<BlockListAuthority> {
        &self.authority
    }

    /// Runs inline on the caller's thread and never fails it.
    pub fn evaluate(&self, package: &str) {
        if !self.authority.is_initialized() {
            trace!("block list not initialized, skip {package}");
            return;
        }

        if self.night.night_mode().is_off() {
            return;
        }

        let blocked = self.authority.contains(package);
        let current = self.flag.read();

        let Some(next) = decide(blocked, current) else {
            return;
        };

        match self.flag.write(next) {
            Ok(()) => debug!("{package}: switching force-dark from {current} to {next}"),
            Err(err) => warn!("{package}: failed to switch force-dark to {next}: {err:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MemoryFlag, NightMode, SharedNightMode};
    use anyhow::{Result, bail};

    struct BrokenFlag;

    impl ForceDarkPort for BrokenFlag {
        fn read(&self) -> bool {
            false
        }

        fn write(&self, _: bool) -> Result<()> {
            bail!("property service unavailable")
        }
    }

    fn engine_with(
        blocked: &[&str],
        mode: NightMode,
        current: bool,
    ) -> (ForceDarkEngine, Arc<MemoryFlag>) {
        let authority = Arc::new(BlockListAuthority::empty());
        authority.replace_all(blocked.iter().copied());

        let flag = Arc::new(MemoryFlag::new(current));
        let engine = ForceDarkEngine::new(
            authority,
            Arc::new(SharedNightMode::new(mode)),
            flag.clone(),
        );

        (engine, flag)
    }

    #[test]
    fn decide_is_an_xnor_gate() {
        assert_eq!(decide(true, true), Some(false));
        assert_eq!(decide(false, false), Some(true));
        assert_eq!(decide(true, false), None);
        assert_eq!(decide(false, true), None);
    }

    #[test]
    fn evaluate_follows_truth_table() {
        for blocked in [false, true] {
            for current in [false, true] {
                let list: &[&str] = if blocked { &["com.target"] } else { &[] };
                let (engine, flag) = engine_with(list, NightMode::Yes, current);

                engine.evaluate("com.target");

                if blocked == current {
                    assert_eq!(flag.writes(), 1, "blocked={blocked} current={current}");
                    assert_eq!(flag.read(), !current);
                } else {
                    assert_eq!(flag.writes(), 0, "blocked={blocked} current={current}");
                    assert_eq!(flag.read(), current);
                }
            }
        }
    }

    #[test]
    fn night_mode_off_never_writes() {
        for blocked in [false, true] {
            for current in [false, true] {
                let list: &[&str] = if blocked { &["com.target"] } else { &[] };
                let (engine, flag) = engine_with(list, NightMode::No, current);

                engine.evaluate("com.target");

                assert_eq!(flag.writes(), 0);
            }
        }
    }

    #[test]
    fn uninitialized_authority_never_writes() {
        let authority = Arc::new(BlockListAuthority::empty());
        let flag = Arc::new(MemoryFlag::new(false));
        let engine = ForceDarkEngine::new(
            authority,
            Arc::new(SharedNightMode::new(NightMode::Yes)),
            flag.clone(),
        );

        for package in ["com.a", "com.b", ""] {
            engine.evaluate(package);
        }

        assert_eq!(flag.writes(), 0);
    }

    #[test]
    fn blocked_and_unblocked_scenario() {
        let (engine, flag) = engine_with(&["com.example.a"], NightMode::Yes, false);

        engine.evaluate("com.example.a");
        assert!(!flag.read());
        assert_eq!(flag.writes(), 0);

        engine.evaluate("com.example.b");
        assert!(flag.read());
        assert_eq!(flag.writes(), 1);

        // back to the blocked app turns it off again
        engine.evaluate("com.example.a");
        assert!(!flag.read());
        assert_eq!(flag.writes(), 2);
    }

    #[test]
    fn write_failure_is_swallowed() {
        let authority = Arc::new(BlockListAuthority::empty());
        authority.replace_all(["com.a"]);

        let engine = ForceDarkEngine::new(
            authority,
            Arc::new(SharedNightMode::new(NightMode::Yes)),
            Arc::new(BrokenFlag),
        );

        engine.evaluate("com.b");
    }
}
