//! Startup errors for mdxd
//!
//! Everything here is fatal: the process exits before or while binding
//! listeners. Per-request failures never surface as these.

use mdx_common::{PortError, ScanError};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("--dir: {path} does not exist or is not a directory")]
    InvalidRoot { path: PathBuf },

    #[error("Failed to scan dictionaries: {0}")]
    Scan(#[source] ScanError),

    #[error("--dir: no dictionaries found under {path}")]
    Discovery { path: PathBuf },

    #[error("None of the {found} discovered dictionaries could be started")]
    NoServers { found: usize },

    #[error(transparent)]
    Ports(#[from] PortError),

    #[error("Failed to bind gateway on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl From<ScanError> for StartupError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::InvalidRoot { path } => StartupError::InvalidRoot { path },
            other => StartupError::Scan(other),
        }
    }
}
