//! Helper to set the backtrace env var.

use std::sync::Once;

static INIT: Once = Once::new();

/// Sets the `RUST_BACKTRACE` environment variable to 1 if it is not already set.
///
/// Must be called at the start of `main`, before any other thread is spawned.
pub fn enable() {
    INIT.call_once(|| {
        if std::env::var_os("RUST_BACKTRACE").is_none() {
            // SAFETY: called before the runtime starts, while the process is single threaded.
            unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
        }
    });
}
