//! Probe error types
//!
//! Probe failures never reach callers of [`HostStatusProbe`]; each probe
//! degrades to a placeholder and the error is only logged.
//!
//! [`HostStatusProbe`]: crate::HostStatusProbe

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A sysfs path could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external command could not be run or exited unsuccessfully
    #[error("Command {program} failed: {message}")]
    Command { program: String, message: String },

    /// Nothing usable was found
    #[error("No {0} information available")]
    Unavailable(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
