use std::sync::Mutex;

/// Hands out archive part suffixes in strict issuance order: "001", "002",
/// ... widening past "999" instead of wrapping. Suffixes are never reused
/// and the issued log is exactly the call history.
#[derive(Default)]
pub struct SuffixAllocator {
    inner: Mutex<SuffixLog>,
}

#[derive(Default)]
struct SuffixLog {
    current: u64,
    issued: Vec<String>,
}

impl SuffixAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_suffix(&self) -> String {
        let mut log = self.inner.lock().unwrap();
        log.current += 1;
        let suffix = format!("{:03}", log.current);
        log.issued.push(suffix.clone());
        suffix
    }

    /// Every suffix issued so far, in issuance order.
    pub fn all_issued(&self) -> Vec<String> {
        self.inner.lock().unwrap().issued.clone()
    }
}
