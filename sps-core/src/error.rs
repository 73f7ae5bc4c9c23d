use sps_types::{payload::PayloadError, BdSeq};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AliasError {
    #[error("Alias {0} is not registered")]
    UnknownAlias(u64),
    #[error("Alias {alias} for metric {name} is already assigned to metric {existing}")]
    AliasConflict {
        alias: u64,
        name: String,
        existing: String,
    },
    #[error("Metric has neither a name nor an alias")]
    Unidentified,
}

#[derive(Error, Debug, PartialEq)]
pub enum LifecycleError {
    #[error("Stale birth: bdSeq {received} timestamp {timestamp} does not supersede online session bdSeq {current} timestamp {current_timestamp}")]
    StaleBirth {
        received: BdSeq,
        timestamp: u64,
        current: BdSeq,
        current_timestamp: u64,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid identifier: {0}")]
    InvalidName(String),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid startup delay: {0}")]
    InvalidStartupDelay(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Per scope errors. None of these affect scopes other than the one the message belongs to.
#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("Sequence violation: expected {expected}, received {received}")]
    SequenceViolation { expected: u8, received: u8 },
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("No birth recorded for scope")]
    UnknownScope,
    #[error(transparent)]
    Alias(#[from] AliasError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}
