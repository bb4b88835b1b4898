//! Concrete collaborator implementations.

pub mod dry_run;
pub mod gh_cli;
pub mod git_cli;

pub use dry_run::{DryRunForge, DryRunVcs};
pub use gh_cli::GhCli;
pub use git_cli::GitCli;
