use anyhow::Result;
use autodark_misc::props;
use autodark_shared::settings::SYSTEM_PROP_FORCE_DARK;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// The global force-dark switch read by the renderer.
pub trait ForceDarkPort: Send + Sync {
    fn read(&self) -> bool;
    fn write(&self, value: bool) -> Result<()>;
}

/// `debug.hwui.force_dark`, unset reads as `false`.
pub struct SystemPropertyFlag;

impl ForceDarkPort for SystemPropertyFlag {
    fn read(&self) -> bool {
        props::get_bool(SYSTEM_PROP_FORCE_DARK, false)
    }

    fn write(&self, value: bool) -> Result<()> {
        props::set_bool(SYSTEM_PROP_FORCE_DARK, value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryFlag {
    value: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }
}

impl ForceDarkPort for MemoryFlag {
    fn read(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    fn write(&self, value: bool) -> Result<()> {
        self.value.store(value, Ordering::Release);
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// `UiModeManager` night modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum NightMode {
    Auto = 0,
    No = 1,
    Yes = 2,
    Custom = 3,
}

impl NightMode {
    pub fn from_raw(value: i64) -> Option<Self> {
        match value {
            0 => Some(NightMode::Auto),
            1 => Some(NightMode::No),
            2 => Some(NightMode::Yes),
            3 => Some(NightMode::Custom),
            _ => None,
        }
    }

    /// Only an explicit `No` disables the engine, auto and custom schedules may be dark.
    pub fn is_off(self) -> bool {
        self == NightMode::No
    }
}

pub trait NightModeSource: Send + Sync {
    fn night_mode(&self) -> NightMode;
}

/// Night mode pushed in by whoever observes it, read lock-free on the hook path.
#[derive(Debug)]
pub struct SharedNightMode(AtomicU8);

impl SharedNightMode {
    pub fn new(mode: NightMode) -> Self {
        Self(AtomicU8::new(mode as u8))
    }

    pub fn set(&self, mode: NightMode) {
        self.0.store(mode as u8, Ordering::Release);
    }
}

impl NightModeSource for SharedNightMode {
    fn night_mode(&self) -> NightMode {
        NightMode::from_raw(self.0.load(Ordering::Acquire) as i64).unwrap_or(NightMode::No)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_no_is_off() {
        assert!(NightMode::No.is_off());
        assert!(!NightMode::Yes.is_off());
        assert!(!NightMode::Auto.is_off());
        assert!(!NightMode::Custom.is_off());
    }

    #[test]
    fn unknown_raw_mode_is_rejected() {
        assert_eq!(NightMode::from_raw(2), Some(NightMode::Yes));
        assert_eq!(NightMode::from_raw(7), None);
        assert_eq!(NightMode::from_raw(-1), None);
    }

    #[test]
    fn shared_night_mode_follows_updates() {
        let mode = SharedNightMode::new(NightMode::No);
        assert_eq!(mode.night_mode(), NightMode::No);

        mode.set(NightMode::Yes);
        assert_eq!(mode.night_mode(), NightMode::Yes);
    }

    #[test]
    fn system_property_flag_round_trips() {
        let flag = SystemPropertyFlag;

        flag.write(true).unwrap();
        assert!(flag.read());
        flag.write(false).unwrap();
        assert!(!flag.read());
    }
}
