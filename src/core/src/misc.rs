use log::error;
use std::panic;
use std::thread;

/// Logs every panic with the thread it happened on before the default hook runs.
pub fn install_panic_hook() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let current = thread::current();
        error!("panic on {}: {info}", current.name().unwrap_or("<unnamed>"));

        // BIONIC_SIGNAL_DEBUGGER, so debuggerd writes a tombstone for the crash
        #[cfg(target_os = "android")]
        unsafe {
            nix::libc::raise(35);
        }

        default_hook(info);
    }))
}
