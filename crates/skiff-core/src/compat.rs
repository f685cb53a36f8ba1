//! Node compatibility constants reported over the channel.
//!
//! The backend emulates a Node-flavored environment; these are the
//! version strings and platform names clients see in `ready`, `pong`,
//! `getInfo`, and the `node -v` / `npm -v` short-circuits.

/// Node version string the backend reports.
pub const NODE_VERSION: &str = "v20.11.1";

/// npm version string the backend reports.
pub const NPM_VERSION: &str = "10.2.4";

/// Platform name in Node nomenclature.
#[must_use]
pub fn platform() -> &'static str {
    match std::env::consts::OS {
        "macos" | "ios" => "darwin",
        "windows" => "win32",
        "android" => "android",
        "freebsd" => "freebsd",
        _ => "linux",
    }
}

/// CPU architecture in Node nomenclature.
#[must_use]
pub fn arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "x86" => "ia32",
        "arm" => "arm",
        _ => "x64",
    }
}
