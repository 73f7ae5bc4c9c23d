use std::{
    fs, io,
    path::PathBuf,
    sync::atomic::{AtomicU8, Ordering},
};

use sps_types::BdSeq;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BdSeqStoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("stored value {0:?} is not a bdSeq")]
    Corrupt(String),
}

/// Persists the bdSeq an edge node will use for its next session.
///
/// The edge node loads the value once when it is built and stores the incremented value each
/// time a session ends, so a restarted process does not reuse the bdSeq of its previous session.
pub trait BdSeqStore {
    fn load(&self) -> Result<BdSeq, BdSeqStoreError>;
    fn store(&self, bdseq: BdSeq) -> Result<(), BdSeqStoreError>;
}

pub type DynBdSeqStore = dyn BdSeqStore + Send + Sync;

/// Keeps the bdSeq in memory. Every new process starts from 0.
#[derive(Debug, Default)]
pub struct MemoryBdSeqStore {
    value: AtomicU8,
}

impl MemoryBdSeqStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BdSeqStore for MemoryBdSeqStore {
    fn load(&self) -> Result<BdSeq, BdSeqStoreError> {
        Ok(BdSeq::new(self.value.load(Ordering::SeqCst)))
    }

    fn store(&self, bdseq: BdSeq) -> Result<(), BdSeqStoreError> {
        self.value.store(bdseq.value(), Ordering::SeqCst);
        Ok(())
    }
}

/// Keeps the bdSeq as a single decimal number in a file. A missing file loads as 0.
#[derive(Debug, Clone)]
pub struct FileBdSeqStore {
    path: PathBuf,
}

impl FileBdSeqStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl BdSeqStore for FileBdSeqStore {
    fn load(&self) -> Result<BdSeq, BdSeqStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BdSeq::default()),
            Err(e) => return Err(e.into()),
        };
        contents
            .trim()
            .parse::<u8>()
            .map(BdSeq::new)
            .map_err(|_| BdSeqStoreError::Corrupt(contents))
    }

    fn store(&self, bdseq: BdSeq) -> Result<(), BdSeqStoreError> {
        fs::write(&self.path, bdseq.to_string())?;
        Ok(())
    }
}
