//! Collaborators shared by the batch, single and merge modes.

use std::sync::Arc;

use fleetpr_core::{PullRequestForge, TicketPattern, VersionControl};

/// Version control, forge and ticket settings for one invocation.
#[derive(Clone)]
pub struct ReleaseContext {
    pub vcs: Arc<dyn VersionControl>,
    pub forge: Arc<dyn PullRequestForge>,
    pub tickets: TicketPattern,
    /// Issue-tracker organization used for ticket links in PR bodies.
    pub org: String,
}

impl ReleaseContext {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        forge: Arc<dyn PullRequestForge>,
        tickets: TicketPattern,
        org: impl Into<String>,
    ) -> Self {
        Self {
            vcs,
            forge,
            tickets,
            org: org.into(),
        }
    }
}
