//! # Waypoint
//!
//! Waypoint ingests periodic location pings from vehicles and compacts them
//! into bounded, chronologically ordered history segments per vehicle.
//!
//! Pings arrive as a compact MessagePack record whose coordinates are packed
//! into a degree index and a fractional bitfield. Accepted pings land in a
//! bounded raw event log; a periodic compaction pass merges them into the
//! segment store and trims the log up to the high-water mark it observed.
//!
//! ## Features
//!
//! - Strongly typed decoding of the packed coordinate wire format
//! - Clock-skew gated ingestion with duplicate suppression
//! - Race-safe, single-flight compaction into paginated segments
//! - HTTP API for ingestion, history lookups and compaction control
//!
//! ## Example
//!
//! ```rust
//! use waypoint::core::{decode, encode, LocationEvent, Position};
//!
//! fn example() -> waypoint::Result<()> {
//!     let ping = LocationEvent::new("N-00-001", 1_700_000_000_000, Position::new(4.35, 50.85));
//!     let wire = encode(&ping)?;
//!     let decoded = decode(&wire)?;
//!     assert_eq!(decoded.vid, "N-00-001");
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::float_cmp)]

/// Core data structures, types and the wire codec
pub mod core;

/// Compaction of the raw event log into history segments
pub mod compaction;

/// Runtime configuration
pub mod config;

pub mod error;

/// HTTP surface
pub mod http;

pub mod ingestion;

/// Raw event log and segment store collaborators
pub mod storage;

// Re-export commonly used types
pub use error::{Error, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn test_error_display() {
        let err = Error::Config(ConfigError::Invalid {
            field: "log_capacity",
            reason: "must be at least 1".to_string(),
        });
        assert_eq!(
            format!("{}", err),
            "Configuration error: invalid log_capacity: must be at least 1"
        );
    }
}
