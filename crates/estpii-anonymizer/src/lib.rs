//! estpii Anonymizer
//!
//! Replaces detected PII spans in text.
//!
//! Operators are configured per entity type:
//! - Replace with a fixed value (or `<ENTITY_TYPE>`)
//! - Mask a number of characters
//! - Redact, hash (SHA-256/SHA-512) or keep the original
//!
//! Output positions of every replacement are reported in character offsets
//! of the rewritten text.

pub mod engine;
pub mod operator;

pub use engine::{
    AnonymizationConfig, AnonymizationResult, AnonymizedItem, AnonymizerEngine,
    DEFAULT_OPERATOR_KEY,
};
pub use operator::{HashType, Operator, OperatorSetting};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{AnonymizationConfig, AnonymizerEngine};
    pub use crate::operator::{Operator, OperatorSetting};
}
