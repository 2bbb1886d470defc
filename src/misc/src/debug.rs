/// Reads the developer switch `debug.autodark.<key>`, e.g. `debug_on!("list")` after
/// `setprop debug.autodark.list 1`. Compiled out to `false` in release builds.
#[macro_export]
macro_rules! debug_on {
    ($key: literal) => {{
        #[cfg(debug_assertions)]
        let enabled = $crate::props::prop_on(concat!("debug.autodark.", $key));
        #[cfg(not(debug_assertions))]
        let enabled = false;

        enabled
    }};
}
