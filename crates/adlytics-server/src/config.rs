/// Re-export `Config` from `adlytics-core` for use within this crate.
///
/// Environment parsing lives in `adlytics-core` so integration tests can
/// build a `Config` without the server.
pub use adlytics_core::config::Config;
