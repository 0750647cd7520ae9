//! mdxd - serve MDict dictionaries over HTTP
//!
//! One listener per dictionary plus a gateway that serves the client shell
//! and lists the running dictionaries.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod html;
pub mod logging;
pub mod orchestrator;
pub mod server;
pub mod shutdown;

pub use error::StartupError;
pub use orchestrator::{Orchestrator, RunState, Settings};
