//! Ironpipe command-line front end.
//!
//! The binary in `main.rs` only parses arguments, sets up logging and
//! dispatches; everything else lives here so it can be tested.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
