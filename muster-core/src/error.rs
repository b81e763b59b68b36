use thiserror::Error;

use crate::checksum::SizeAndChecksum;

pub type Result<T> = std::result::Result<T, CoordinationError>;

/// Errors surfaced by the coordination core. Absence of a name or key in a
/// lookup is never an error; those return `None`. The core does not retry
/// anything internally; retry policy belongs to the orchestration layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    /// Two replicas announced the same part name with different checksums.
    /// Replica state has diverged and the backup cannot trust either copy.
    #[error("part {part_name:?} of table {table} has divergent checksums across replicas")]
    PartChecksumMismatch { table: String, part_name: String },

    /// `update_file_info` was called for a key that was never registered.
    #[error("no file registered under content key {key}")]
    UnknownFileKey { key: SizeAndChecksum },

    /// A stage barrier deadline expired with hosts still outstanding.
    #[error("stage {stage:?} timed out waiting for hosts {missing_hosts:?}")]
    StageTimeout { stage: String, missing_hosts: Vec<String> },

    /// A host reported a stage as failed; fans out to every waiter so the
    /// whole backup aborts instead of timing out host by host.
    #[error("host {host:?} failed during stage {stage:?}: {message}")]
    HostFailure { host: String, stage: String, message: String },

    /// The session was aborted while callers were still waiting.
    #[error("backup aborted: {reason}")]
    Aborted { reason: String },

    /// A mutation arrived after part ownership was finalized. This is a
    /// caller-side ordering bug, not a recoverable condition.
    #[error("registration for table {table} after part ownership was finalized")]
    LateRegistration { table: String },
}
