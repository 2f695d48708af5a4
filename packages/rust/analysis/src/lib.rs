//! Prompt analysis for PromptForge: section parsing and gap detection.
//!
//! The section parser splits raw text into ordered labeled regions; the gap
//! detector runs a fixed battery of independent rules over them and produces
//! an [`promptforge_shared::AmbiguityReport`]. The deep battery extends the
//! standard rules with auto-fix scaffolds for agent mode.

pub mod deep;
pub mod domains;
pub mod gaps;
pub mod sections;

pub use deep::{DeepDetectOptions, deep_detect};
pub use gaps::{detect, detect_localized};
pub use sections::parse_sections;
