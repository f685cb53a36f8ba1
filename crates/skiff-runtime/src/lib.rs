#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! In-process JavaScript execution.
//!
//! Project scripts run inside an embedded `deno_core` isolate instead
//! of a spawned subprocess: the host's standard streams, argv, working
//! directory, and `process.exit` are all redirected to the owning
//! task, and long-running programs unwind cooperatively through the
//! task's cancellation token (exit code 130).

pub mod bin;
pub mod loader;
pub mod runtime;

pub use bin::resolve_bin;
pub use runtime::{run, RunRequest};

/// Exit code reported when a script is canceled.
pub const EXIT_CANCELED: i32 = 130;
