use anyhow::Result;

pub mod activity;
pub mod adapter;
pub mod ime;

pub use adapter::{LaunchAdapter, LaunchEntry, RawLaunchEvent, SdkVersion};

pub type LaunchCallback = Box<dyn Fn(&RawLaunchEvent) + Send + Sync>;

/// Whatever places the method hooks in the privileged process.
pub trait EventSource {
    fn sdk_int(&self) -> i32;

    /// Hooks both launch entries of the version's layout and forwards every call to `callback`.
    fn install_launch_hooks(&self, version: SdkVersion, callback: LaunchCallback) -> Result<()>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImePhase {
    /// Before `InputMethodService#updateInputViewShown`
    InputViewShown,
    /// After `InputMethodService#setInputView`, the host already holds the new view
    SetInputView,
}

pub type ImeCallback = Box<dyn Fn(ImePhase, &dyn ime::InputMethodHost) + Send + Sync>;

/// Hook placement inside an input-method process.
pub trait ImeEventSource {
    fn package(&self) -> &str;
    fn install_ime_hooks(&self, callback: ImeCallback) -> Result<()>;
}
