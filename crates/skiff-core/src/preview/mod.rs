//! Preview source transforms and bundle assembly.
//!
//! Pure functions over project sources; the daemon's HTTP server calls
//! [`build_bundle`] on every page request and serves the result.

pub mod bundle;
pub mod jsx;
pub mod modules;

pub use bundle::build_bundle;
pub use jsx::rewrite_jsx;
pub use modules::rewrite_modules;
