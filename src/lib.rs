//! Scriptplay - record and replay HTTP conversations as markdown scripts
//!
//! A session in record mode forwards each request to the real service and
//! writes the exchange to a human-readable script. In playback mode the same
//! script answers requests by position, without the real service.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod interaction;
pub mod interactor;
pub mod manipulation;
pub mod monitor;
pub mod network;
pub mod pipeline;
pub mod script;
pub mod session;

pub use error::{PlaybackError, Result, ScriptError};
