#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]

//! Core subsystems of the skiff backend: the npm-lite package manager,
//! in-process shell builtins, filesystem bridge operations, and the
//! preview source transforms. The daemon crate wires these behind the
//! message channel.

pub mod compat;
pub mod config;
pub mod fsops;
pub mod pkg;
pub mod preview;
pub mod shell;
pub mod sink;

pub use config::Config;
pub use sink::{Sink, StreamKind};
