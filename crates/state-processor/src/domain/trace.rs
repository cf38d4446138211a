//! Per-transaction trace accumulator.
//!
//! The engine appends free-form trace lines while a transaction runs. The
//! processor resets the buffer before every transaction so a trace never
//! carries data from its predecessor.

use crate::domain::value_objects::Hash;
use serde::{Deserialize, Serialize};

/// Trace buffer owned by the processor and lent to the engine.
#[derive(Debug, Default)]
pub struct TraceBuffer {
    buf: String,
}

impl TraceBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything accumulated so far.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Appends one trace line.
    pub fn push_line(&mut self, line: impl AsRef<str>) {
        self.buf.push_str(line.as_ref());
        self.buf.push('\n');
    }

    /// Appends raw text without a line break.
    pub fn push_str(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    /// Current contents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// True if nothing has been recorded since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Copies the current contents into a record for `tx_hash`.
    #[must_use]
    pub fn snapshot(&self, tx_hash: Hash) -> TraceRecord {
        TraceRecord {
            tx_hash: tx_hash.to_hex(),
            tx_trace: self.buf.clone(),
        }
    }
}

/// Persisted trace document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Transaction hash (natural key).
    pub tx_hash: String,
    /// Opaque trace payload.
    pub tx_trace: String,
}
