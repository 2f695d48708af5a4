//! Budgeted integration of library candidates into a prompt: a fast
//! deterministic marker-based path and a model-assisted deep path that
//! falls back to the fast result whenever the collaborator misbehaves.

pub mod deep;
pub mod fast;

pub use deep::{Rephraser, integrate_deep};
pub use fast::{Integration, estimate_tokens, integrate_fast, marker};
