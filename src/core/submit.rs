//! Batched external calls made by bulk actions.

use async_trait::async_trait;
use thiserror::Error;

/// Opaque account credential, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("call rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Issues one system call carrying the keys of every selected notification.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    async fn submit(&self, signer: &Signer, entity_ids: Vec<Vec<String>>) -> Result<(), SubmitError>;
}

/// Dry-run submitter that only logs the call.
pub struct LoggingSubmitter;

#[async_trait]
impl BatchSubmitter for LoggingSubmitter {
    async fn submit(&self, signer: &Signer, entity_ids: Vec<Vec<String>>) -> Result<(), SubmitError> {
        log::info!(
            "Submitting batch of {} for {}: {:?}",
            entity_ids.len(),
            signer.0,
            entity_ids
        );
        Ok(())
    }
}
