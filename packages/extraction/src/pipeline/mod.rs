//! Extraction pipeline: prompts, response transformation, sync loop.

pub mod prompts;
pub mod sync;
pub mod transform;

pub use prompts::{extraction_prompt_hash, format_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
pub use sync::{run_sync, NoopObserver, SyncCounters, SyncObserver};
pub use transform::{clamp_confidence, transform_response, TransformOutcome};
