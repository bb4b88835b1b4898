//! Ticket id extraction and PR body rendering.

use std::collections::BTreeSet;

use regex::Regex;

use crate::domain::error::{FleetError, Result};

/// Compiled, case-insensitive ticket matcher. An empty pattern disables
/// extraction entirely.
#[derive(Debug, Clone, Default)]
pub struct TicketPattern {
    regex: Option<Regex>,
}

impl TicketPattern {
    /// Compile `pattern` as `(?i)(<pattern>)`.
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Ok(Self::disabled());
        }
        let regex = Regex::new(&format!("(?i)({pattern})"))
            .map_err(|e| FleetError::Config(format!("invalid tickets.pattern {pattern:?}: {e}")))?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn disabled() -> Self {
        Self { regex: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.regex.is_some()
    }

    /// Uppercased, de-duplicated, sorted ticket ids found anywhere in `text`.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_uppercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Render the release PR body: one closing link per ticket.
///
/// Returns an empty string when there are no tickets.
pub fn render_pr_body(tickets: &[String], org: &str) -> String {
    if tickets.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = tickets
        .iter()
        .map(|t| format!("### - Closes [{t}]({})", ticket_url(org, t)))
        .collect();
    format!("# Tickets\n\n{}", lines.join("\n"))
}

/// Display link for a ticket in the issue tracker.
pub fn ticket_url(org: &str, ticket: &str) -> String {
    format!("https://linear.app/{org}/issue/{}", ticket.to_lowercase())
}
