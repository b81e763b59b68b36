use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a content digest in bytes.
pub const CHECKSUM_WIDTH: usize = 32;

/// Content digest, compared byte-wise.
pub type Checksum = [u8; CHECKSUM_WIDTH];

/// Identifies physically distinct file content. Two files with the same key
/// are assumed byte-identical; size-0 files never get a key entry in the
/// content index and are tracked by name only.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeAndChecksum {
    pub size: u64,
    pub checksum: Checksum,
}

impl SizeAndChecksum {
    pub fn new(size: u64, checksum: Checksum) -> Self {
        Self { size, checksum }
    }
}

impl fmt::Display for SizeAndChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.size)?;
        for b in &self.checksum {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Digest of a byte slice using the library's content hash.
pub fn checksum_of(data: &[u8]) -> Checksum {
    *blake3::hash(data).as_bytes()
}
