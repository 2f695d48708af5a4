//! Shared types, error model, and configuration for PromptForge.
//!
//! This crate is the foundation depended on by all other PromptForge crates.
//! It provides:
//! - [`PromptForgeError`] / [`CollaboratorError`] — the unified error model
//! - Domain types ([`Section`], [`Gap`], [`AmbiguityReport`],
//!   [`EnrichmentCandidate`], [`EnrichmentResult`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CorpusConfig, DefaultsConfig, JudgeConfig, ProviderConfig, config_dir,
    config_file_path, expand_home, has_api_key, init_config, load_config, load_config_from,
};
pub use error::{CollaboratorError, CollaboratorResult, PromptForgeError, Result};
pub use types::{
    AgentMetrics, AmbiguityReport, DeepGap, EnrichmentCandidate, EnrichmentMetrics,
    EnrichmentMode, EnrichmentOptions, EnrichmentResult, Gap, GapKind, Language, RunId, Section,
    SectionName, SectionScore, Severity,
};
