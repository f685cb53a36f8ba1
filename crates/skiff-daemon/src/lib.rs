#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]

//! The skiff backend daemon.
//!
//! Reads line-delimited JSON frames from the host on stdin, routes them
//! through the command supervisor, and writes reply frames to stdout.
//! stdout belongs to the protocol; diagnostics go to stderr via
//! `tracing`.

pub mod logging;
pub mod npm;
pub mod preview;
pub mod router;
pub mod server;
pub mod state;

pub use server::run_loop;
pub use state::DaemonState;
