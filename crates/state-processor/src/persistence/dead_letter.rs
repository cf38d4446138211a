//! # Dead Letters
//!
//! Line format of the error log:
//!
//! ```text
//! <Transaction|Trace|Receipt>|<record json>|<error text>
//! ```
//!
//! If the record itself cannot be serialized, only its key is kept:
//!
//! ```text
//! <Kind>;<tx_hash>;<serialization error>
//! ```
//!
//! Lines are parsed by reading the JSON value as a stream, so `|` inside the
//! payload or the error text needs no escaping.

use crate::domain::records::{Record, RecordKind};
use crate::errors::DeadLetterParseError;
use std::fmt;

/// Separator of the regular line format.
pub const FIELD_SEPARATOR: char = '|';

/// Separator of the key-only fallback format.
pub const FALLBACK_SEPARATOR: char = ';';

/// A record that could not be stored, with the last error seen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadLetter {
    /// The record.
    pub record: Record,
    /// Error text recorded with it.
    pub error: String,
}

impl DeadLetter {
    /// Wraps a failed record.
    pub fn new(record: Record, error: impl fmt::Display) -> Self {
        Self {
            record,
            error: error.to_string(),
        }
    }

    /// Kind of the wrapped record.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.record.kind()
    }

    /// Renders the error-log line.
    ///
    /// Falls back to the key-only format if serialization fails. Line
    /// breaks in the error text are flattened so one record stays one line.
    #[must_use]
    pub fn to_line(&self) -> String {
        let label = self.record.kind().label();
        let error = single_line(&self.error);
        match self.record.to_json() {
            Ok(json) => format!("{label}{FIELD_SEPARATOR}{json}{FIELD_SEPARATOR}{error}"),
            Err(e) => format!(
                "{label}{FALLBACK_SEPARATOR}{}{FALLBACK_SEPARATOR}{}",
                self.record.key(),
                single_line(&e.to_string())
            ),
        }
    }

    /// Parses one error-log line.
    pub fn parse(line: &str) -> Result<Self, DeadLetterParseError> {
        let line = line.trim_end_matches(['\r', '\n']);

        let Some((label, rest)) = line.split_once(FIELD_SEPARATOR) else {
            return Err(parse_fallback(line));
        };
        if label.is_empty() {
            return Err(DeadLetterParseError::MissingKind);
        }
        let kind: RecordKind = label
            .parse()
            .map_err(|_| DeadLetterParseError::UnknownKind(label.to_string()))?;

        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<serde_json::Value>();
        let doc = match stream.next() {
            Some(Ok(doc)) => doc,
            Some(Err(e)) => return Err(DeadLetterParseError::InvalidPayload(e.to_string())),
            None => return Err(DeadLetterParseError::InvalidPayload("empty payload".into())),
        };
        let offset = stream.byte_offset();

        let error = rest[offset..]
            .strip_prefix(FIELD_SEPARATOR)
            .ok_or(DeadLetterParseError::MissingError)?;

        let record = Record::from_document(kind, doc)
            .map_err(|e| DeadLetterParseError::InvalidPayload(e.to_string()))?;

        Ok(Self {
            record,
            error: error.to_string(),
        })
    }
}

impl fmt::Display for DeadLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

fn parse_fallback(line: &str) -> DeadLetterParseError {
    let mut parts = line.splitn(3, FALLBACK_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(kind), Some(tx_hash), Some(error)) if !kind.is_empty() => {
            DeadLetterParseError::NoPayload {
                kind: kind.to_string(),
                tx_hash: tx_hash.to_string(),
                error: error.to_string(),
            }
        }
        _ => DeadLetterParseError::MissingKind,
    }
}
