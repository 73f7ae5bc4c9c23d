use sps_client::ClientError;
use sps_core::error::{AliasError, ConfigError};
use thiserror::Error;

use crate::bdseq_store::BdSeqStoreError;

#[derive(Error, Debug, PartialEq)]
pub enum PublishError {
    #[error("No metrics provided.")]
    NoMetrics,
    #[error("Edge node is offline.")]
    Offline,
    #[error("Not birthed.")]
    UnBirthed,
    #[error("Data publishing is suppressed until the primary host is online.")]
    Suppressed,
    #[error("Alias error: {0}.")]
    Alias(#[from] AliasError),
    #[error("Transport error: {0}.")]
    Transport(#[from] ClientError),
}

#[derive(Error, Debug, PartialEq)]
pub enum DeviceRegistrationError {
    #[error("Duplicate device")]
    DuplicateDevice,
    #[error("Invalid device name: {0}")]
    InvalidName(String),
}

/// Errors raised by [EoNBuilder::build](crate::EoNBuilder::build). These are fatal: the edge node is not started.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("group id must be provided")]
    MissingGroupId,
    #[error("node id must be provided")]
    MissingNodeId,
    #[error("invalid node identifier: {0}")]
    InvalidName(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unable to load bdSeq: {0}")]
    BdSeqStore(#[from] BdSeqStoreError),
}
