//! stepbatch-server: Step scheduling, batching and configuration
//!
//! This crate turns request submissions into batched executor calls:
//! - Sequence lanes preparing requests in submission order
//! - Step-local batch coordinators with intra-step deduplication
//! - The scheduler driving step boundaries and fanning results out
//! - Configuration management
//! - Structured logging and metric descriptions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              stepbatch-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Configuration management  │
//! │  scheduler/     - Step scheduler            │
//! │    lane.rs        - Sequence lanes          │
//! │    step.rs        - Step-local context      │
//! │    coordinator.rs - Batch coordinator       │
//! │  observability/ - Logging and metrics       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod observability;
pub mod scheduler;

// Re-exports for convenience
pub use config::{ConfigLoadError, SchedulerConfig};
pub use scheduler::{Scheduler, StepLoop, StepReport};
