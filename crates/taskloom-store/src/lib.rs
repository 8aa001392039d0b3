// Error types
pub mod error;

// Indexing decision state machine
pub mod decision;

// External-call guards
pub mod breaker;
pub mod limiter;

// Embedding pipeline pieces
pub mod chunk;
pub mod embed;
pub mod sanitize;

// Vector store boundary
pub mod vector;

// The pipeline itself
pub mod pipeline;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use chunk::{MAX_CHUNK_SIZE, SubChunk, TaskChunk, split_chunk};
pub use decision::{
    DecisionConfig, IndexAction, IndexingDecision, TaskActivity, decide, mark_failure,
    mark_success, sample_jitter,
};
pub use embed::{
    CACHE_TTL_DAYS, EXPECTED_DIM, EmbeddingCache, EmbeddingProvider, HttpEmbedder,
    validate_vector,
};
pub use error::{Error, Result};
pub use limiter::{RateLimiter, SlidingWindowLimiter};
pub use pipeline::{BATCH_MAX, IndexReport, PipelineConfig, UpsertPipeline};
pub use sanitize::{NULL_ALLOWED_FIELDS, sanitize_payload};
pub use vector::{Point, QdrantStore, VectorStore};
