//! Collaborator ports.
//!
//! The orchestrator talks to version control, the pull-request forge and
//! its CI runs only through these traits. Real implementations shell out to
//! `git` and `gh` (see [`crate::adapters`]); tests inject [`crate::fakes`].

pub mod actions;
pub mod forge;
pub mod vcs;

pub use actions::WorkflowRuns;
pub use forge::PullRequestForge;
pub use vcs::VersionControl;
