//! Pipeline orchestration for PromptForge: the quality judge collaborator,
//! the agent-mode refinement loop, and the `enrich_master_prompt` entry
//! point that ties detection, retrieval, and integration together.

pub mod agent;
pub mod judge;
pub mod pipeline;

pub use agent::{AgentRun, refine};
pub use judge::{HttpJudge, JudgeReport, JudgeSuggestion, QualityJudge, SuggestionKind};
pub use pipeline::{Collaborators, enrich_master_prompt};
