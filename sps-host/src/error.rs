use sps_core::error::ConfigError;
use thiserror::Error;

/// Errors raised when constructing a [HostApplication](crate::HostApplication). These are fatal.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Invalid host id: {0}")]
    InvalidHostId(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
