//! fluxgate line protocol primitives
//!
//! Turns loosely-typed, user-authored strings into well-formed InfluxDB
//! line protocol records.
//!
//! # Key Components
//!
//! - **parse**: `key=value` list parsing for tags and fields
//! - **point**: measurement records with typed field values
//! - **encode**: line protocol serialization with wall-clock timestamps
//! - **time**: time source abstraction for the encoder

pub mod encode;
pub mod error;
pub mod parse;
pub mod point;
pub mod time;

// Re-exports
pub use encode::LineEncoder;
pub use error::{ProtoError, Result};
pub use parse::{parse_fields, parse_tags};
pub use point::{FieldSet, FieldValue, KeyedSet, Point, TagSet};
pub use time::{FixedTimeProvider, SystemTimeProvider, TimeProvider};
