//! Dependency resolution engine: backtracking search with an explicit
//! decision stack, conflict-directed backjumping, locked-version
//! preference, and deterministic install-plan generation.

pub mod conflict;
pub mod graph;
pub mod plan;
pub mod resolver;

pub use conflict::{ChainLink, RequirementChain};
pub use plan::Operation;
pub use resolver::Resolver;
