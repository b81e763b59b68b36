pub mod checksum;
pub mod error;
pub mod file_registry;
pub mod part_tracker;
pub mod session;
pub mod stage_sync;
pub mod suffix;

pub use checksum::{checksum_of, Checksum, SizeAndChecksum};
pub use error::{CoordinationError, Result};
pub use file_registry::{FileInfo, FileRegistry};
pub use part_tracker::{MismatchPolicy, PartNameAndChecksum, ReplicatedPartTracker, TableId};
pub use session::{BackupCoordination, DistributedCoordination, LocalCoordination, PREPARE_STAGE};
pub use stage_sync::StageSync;
pub use suffix::SuffixAllocator;
