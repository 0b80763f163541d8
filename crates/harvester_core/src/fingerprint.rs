use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::Record;

pub const DEFAULT_FINGERPRINT_PREFIX: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintVerdict {
    Fresh,
    /// Same author and caption prefix seen earlier in this session, still
    /// without a timestamp.
    Repeat,
}

/// In-session soft dedup for records that carry no timestamp.
///
/// Timestamped records are never tracked; their store key is stable enough.
#[derive(Debug, Clone)]
pub struct CaptionFingerprints {
    prefix_chars: usize,
    seen: HashSet<[u8; 32]>,
}

impl CaptionFingerprints {
    pub fn new(prefix_chars: usize) -> Self {
        Self {
            prefix_chars,
            seen: HashSet::new(),
        }
    }

    pub fn observe(&mut self, record: &Record) -> FingerprintVerdict {
        if !record.timestamp().trim().is_empty() {
            return FingerprintVerdict::Fresh;
        }
        if self.seen.insert(self.digest(record)) {
            FingerprintVerdict::Fresh
        } else {
            FingerprintVerdict::Repeat
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn digest(&self, record: &Record) -> [u8; 32] {
        let prefix: String = record.text().chars().take(self.prefix_chars).collect();
        let mut hasher = Sha256::new();
        hasher.update(record.author().as_bytes());
        hasher.update([0x1f]);
        hasher.update(prefix.as_bytes());
        hasher.finalize().into()
    }
}

impl Default for CaptionFingerprints {
    fn default() -> Self {
        Self::new(DEFAULT_FINGERPRINT_PREFIX)
    }
}
