//! estpii Analyzer
//!
//! Detects PII in Estonian and multilingual text.
//!
//! Recognizers fall into three families:
//! - Pattern recognizers: regular expressions with optional checksum validation
//! - Deny-list recognizers: literal term lists
//! - Model recognizers: statistical taggers (EstBERT via Candle, or a remote
//!   multilingual NER sidecar) with a label-to-entity mapping
//!
//! The `AnalyzerEngine` runs every recognizer registered for a language
//! concurrently and resolves overlapping candidates into a deterministic,
//! overlap-free `RecognitionResult`.

pub mod bert;
pub mod builtin;
pub mod config;
pub mod deny_list;
pub mod engine;
pub mod model;
pub mod overlap;
pub mod pattern;
pub mod recognizer;
pub mod registry;
pub mod remote;
pub mod validators;

pub use config::{
    AnalyzerConfig, DeviceSpec, EntityTypeSettings, EstBertConfig, NlpConfig, NlpModel,
    PatternSpec, RecognizerSpec, RecognizerSpecKind,
};
pub use deny_list::DenyListRecognizer;
pub use engine::{AnalysisOutcome, AnalysisRequest, AnalyzerEngine, RecognizerFailure};
pub use model::{ModelRecognizer, TaggedEntity, Tagger};
pub use overlap::{resolve_overlaps, Candidate, ConflictPolicy, TieBreaker};
pub use pattern::{ContextEnhancer, InvalidMatchPolicy, Pattern, PatternRecognizer};
pub use recognizer::{Recognizer, RecognizerInfo, RecognizerKind};
pub use registry::RecognizerRegistry;
pub use remote::RemoteTagger;
pub use validators::Validator;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{AnalysisRequest, AnalyzerEngine};
    pub use crate::model::{ModelRecognizer, Tagger};
    pub use crate::overlap::{ConflictPolicy, TieBreaker};
    pub use crate::pattern::PatternRecognizer;
    pub use crate::recognizer::Recognizer;
    pub use crate::registry::RecognizerRegistry;
}
