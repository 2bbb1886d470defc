use log::{error, warn};
use std::fmt::Debug;

/// Logging shortcuts for results whose error the caller cannot act on.
pub trait ResultExt<T> {
    /// Warns and turns the error into `None`, for reads that fall back to a default.
    fn ok_or_warn(self) -> Option<T>;

    /// Logs and drops the error, for side effects on a path that must never fail its caller.
    fn log_if_error(self);
}

impl<T, E: Debug> ResultExt<T> for Result<T, E> {
    fn ok_or_warn(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("{err:?}");
                None
            }
        }
    }

    fn log_if_error(self) {
        if let Err(err) = self {
            error!("{err:?}")
        }
    }
}
