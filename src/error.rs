//! Error handling for marketsnap
//!
//! Defines the domain error taxonomy and establishes a unified Result type
//! using anyhow for context chaining in the application layers.

use thiserror::Error;

/// Core error types for snapshot computation
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// A date/time input could not be parsed. Fatal to the one call only.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// A single instrument could not be fetched. Recorded as a warning by the
    /// snapshot builder, never propagated out of it.
    #[error("fetch failed for {instrument}: {reason}")]
    InstrumentFetch { instrument: String, reason: String },

    /// Not a single configured instrument produced a usable price.
    #[error("no usable price data for any of the {attempted} configured instruments")]
    NoUsableInstruments { attempted: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application-level operations
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting_is_readable() {
        let err = SnapshotError::InvalidDate("2024-13-45".to_string());
        assert_eq!(err.to_string(), "invalid date: 2024-13-45");
    }

    #[test]
    fn test_fetch_failure_names_instrument() {
        let err = SnapshotError::InstrumentFetch {
            instrument: "Gold".to_string(),
            reason: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "fetch failed for Gold: timed out");
    }

    #[test]
    fn test_no_usable_instruments_is_distinct() {
        let err: anyhow::Error = SnapshotError::NoUsableInstruments { attempted: 5 }.into();
        assert!(matches!(
            err.downcast_ref::<SnapshotError>(),
            Some(SnapshotError::NoUsableInstruments { attempted: 5 })
        ));
    }

    #[test]
    fn test_anyhow_context_chains_errors() {
        use anyhow::Context;
        let result: Result<()> =
            Err(anyhow::anyhow!("original error")).context("failed to load config");
        match result {
            Err(e) => {
                assert!(e.to_string().contains("failed to load config"));
                let debug_msg = format!("{:?}", e);
                assert!(debug_msg.contains("original error"));
            }
            Ok(_) => panic!("expected error"),
        }
    }
}
