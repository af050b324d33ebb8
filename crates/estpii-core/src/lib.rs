//! estpii Core
//!
//! Core types and utilities shared across the estpii components.
//!
//! This crate provides:
//! - Span, entity type, and language types produced by recognizers
//! - The overlap-free `RecognitionResult` consumed by the anonymizer
//! - Character/byte offset translation for non-ASCII (Estonian) text
//! - Error types and result handling

pub mod error;
pub mod text;
pub mod types;

pub use error::{Error, Result};
pub use text::TextIndex;
pub use types::{AnalysisExplanation, EntityType, Language, RecognitionResult, Span};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::text::TextIndex;
    pub use crate::types::{AnalysisExplanation, EntityType, Language, RecognitionResult, Span};
}
