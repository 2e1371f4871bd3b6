//! This module provides a built-in logger implementation.
//!
//! The built-in logger implementation uses the `env_logger` crate. It is
//! enabled by the Cargo feature "builtin_env_logger" which is enabled by
//! default. When enabled, it is initialized the first time a
//! [`MemContext`](crate::context::MemContext) is created, and shows logs of
//! level WARN or lower (the lower, the more important).
//!
//! Embedders that route `log` output through their own backend should disable
//! the feature and register their implementation before creating a context.

/// Attempt to init a env_logger for the substrate.
/// Does nothing if the "builtin_env_logger" feature is disabled.
pub(crate) fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                // By default, show warnings only. Transmigration fallbacks
                // and OOM diagnostics are warnings.
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "warn"),
            );

            match result {
                Ok(()) => {
                    debug!("omnimem initialized the logger.");
                }
                Err(e) => {
                    // `log::SetLoggerError` can only mean a logger is already registered.
                    debug!("omnimem failed to initialize the built-in env_logger: {e}");
                }
            }
        } else {
            debug!("omnimem didn't initialize the built-in env_logger. The Cargo feature \"builtin_env_logger\" is not enabled.");
        }
    }
}
