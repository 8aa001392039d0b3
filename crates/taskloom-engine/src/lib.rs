// Content classification
pub mod classify;

// Skeleton construction
pub mod builder;

// Delegation extraction
pub mod instructions;

// Prefix normalisation
pub mod normalize;

// Instruction index
pub mod radix;

// Two-pass hierarchy reconstruction
pub mod reconstruct;

pub use builder::{BuildOutcome, SkeletonBuilder};
pub use classify::{
    Classification, classify_messages, classify_text, classify_transcript, classify_ui_events,
};
pub use instructions::{ExtractedDelegation, canonicalize_mode, extract_delegations};
pub use normalize::{grapheme_len, is_substantial, normalize_prefix};
pub use radix::{PrefixEntry, RadixTree, SimilarMatch};
pub use reconstruct::{
    MatchMode, Pass1Metrics, Pass2Metrics, ReconstructionConfig, ReconstructionEngine,
    TaskResolution,
};
