//! # groundwork-runtime
//!
//! Async side of groundwork: everything that talks to a text generator or a
//! store.
//!
//! - Fact Extractor: summary → candidate assertions → grounded facts
//! - Verification pipeline (CoVe): Plan / Execute / Verify / Final per fact
//! - Fact Store: append-only, versioned, transactional
//! - [`FactPipeline`]: Extract → Validate → Verify → Store with cancellation
//!
//! The deterministic parts (grounding, the four validators, the CoVe
//! decision arithmetic) live in `groundwork-core`. This crate never decides
//! whether a fact is valid; it only gathers the inputs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use groundwork_runtime::{FactPipeline, MemoryFactStore, RuntimeConfig};
//! use groundwork_runtime::providers::OpenAiProvider;
//! use groundwork_runtime::capability::LlmGenerator;
//!
//! let config = RuntimeConfig::from_yaml_file("config/groundwork.example.yaml")?;
//! let provider = Arc::new(OpenAiProvider::from_env()?);
//! let generator = Arc::new(LlmGenerator::new(provider, config.generation.clone()));
//! let pipeline = FactPipeline::new(generator, Arc::new(MemoryFactStore::new()), &config);
//!
//! let report = pipeline.process(&source, &CancellationToken::new()).await?;
//! ```

pub mod cache;
pub mod capability;
pub mod config;
pub mod digest;
pub mod extractor;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod response;
pub mod schema;
pub mod source;
pub mod store;
pub mod testing;
pub mod verification;

pub use cache::{DecompositionCache, DecompositionKey};
pub use capability::{
    CallSite, Generation, GenerationContext, GenerationError, LlmGenerator, ResilientGenerator,
    TextGenerator,
};
pub use config::{CacheConfig, RetryConfig, RuntimeConfig, TimeoutConfig};
pub use digest::{attach_facts, FactsRequest};
pub use extractor::{ExtractionError, ExtractionOutput, FactExtractor};
pub use orchestrator::{FactPipeline, PipelineError, PipelineReport, PipelineStats};
pub use source::{MemorySourceRepository, SourceError, SourceRepository};
pub use store::{store_correction, FactStore, MemoryFactStore, StoreError};
#[cfg(feature = "sqlite")]
pub use store::SqliteFactStore;
pub use verification::{VerificationError, VerificationOutcome, VerificationPipeline};
