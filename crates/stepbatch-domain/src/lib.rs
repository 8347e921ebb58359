//! stepbatch-domain: Core request deduplication and caching types
//!
//! This crate contains the building blocks shared by every batch kind:
//! - Request descriptors with identity, data source and sequence group
//! - The result cache with data-source scoped invalidation
//! - The batch executor plug-in contract
//! - Result handles shared by every waiter of one request
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              stepbatch-domain                │
//! ├─────────────────────────────────────────────┤
//! │  descriptor.rs - Request metadata           │
//! │  cache/        - Scoped result caching      │
//! │  executor.rs   - Batch execution contract   │
//! │  handle.rs     - Shared result handles      │
//! │  error.rs      - Batch and scheduler errors │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod handle;

// Re-export commonly used types at the crate root
pub use cache::{register_cache_metrics, CacheKey, ResultCache, ResultCacheConfig};
pub use descriptor::{DataSource, RequestDescriptor, SequenceGroup};
pub use error::{BatchError, BatchResult, SchedulerError, SchedulerResult};
pub use executor::{BatchExecutor, BatchOutcome, BatchQuery};
pub use handle::{Resolver, ResultHandle};
