//! # Event-Type Cleaner
//!
//! Normalises user supplied sources and event types into a form the backend accepts.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CleanError {
    #[error("event type {0:?} is empty after cleaning")]
    EmptyType(String),
    #[error("source {0:?} is empty after cleaning")]
    EmptySource(String),
}

/// Normalises raw strings into backend-safe form
pub trait Cleaner: Send + Sync {
    /// # Errors
    /// Returns an error when nothing usable remains.
    fn clean_source(&self, source: &str) -> Result<String, CleanError>;

    /// # Errors
    /// Returns an error when nothing usable remains.
    fn clean_event_type(&self, event_type: &str) -> Result<String, CleanError>;
}

/// Removes every character outside an allowed set
#[derive(Debug, Clone)]
pub struct CharsetCleaner {
    invalid_type_chars: Regex,
    invalid_source_chars: Regex,
}

impl CharsetCleaner {
    /// Stream subjects: dots separate tokens, wildcards and whitespace are not allowed
    ///
    /// # Errors
    /// Returns an error if a pattern fails to compile.
    pub fn for_stream() -> anyhow::Result<Self> {
        Self::new(r"[^a-zA-Z0-9._\-]", r"[^a-zA-Z0-9_\-]")
    }

    /// Event-mesh subjects: only alphanumerics and dots
    ///
    /// # Errors
    /// Returns an error if a pattern fails to compile.
    pub fn for_event_mesh() -> anyhow::Result<Self> {
        Self::new(r"[^a-zA-Z0-9.]", r"[^a-zA-Z0-9]")
    }

    fn new(type_pattern: &str, source_pattern: &str) -> anyhow::Result<Self> {
        Ok(Self {
            invalid_type_chars: Regex::new(type_pattern)
                .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?,
            invalid_source_chars: Regex::new(source_pattern)
                .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?,
        })
    }
}

impl Cleaner for CharsetCleaner {
    fn clean_source(&self, source: &str) -> Result<String, CleanError> {
        let cleaned = self.invalid_source_chars.replace_all(source, "").into_owned();
        if cleaned.is_empty() {
            return Err(CleanError::EmptySource(source.to_string()));
        }
        Ok(cleaned)
    }

    fn clean_event_type(&self, event_type: &str) -> Result<String, CleanError> {
        let cleaned = self.invalid_type_chars.replace_all(event_type, "").into_owned();
        if cleaned.is_empty() || cleaned.split('.').all(str::is_empty) {
            return Err(CleanError::EmptyType(event_type.to_string()));
        }
        Ok(cleaned)
    }
}
