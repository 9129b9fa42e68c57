//! Change request status and its transition graph.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Status of a change request.
///
/// ```text
/// Pending ──► Approved ──► SentToAudit ──► Solved
///    │           │  └────► InProgress ──► Completed
///    │           └───────────────────────► Completed
///    └──► Rejected
/// (Pending | Approved | InProgress | SentToAudit) ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "Approved")]
    Approved,
    #[serde(rename = "Rejected")]
    Rejected,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Cancelled")]
    Cancelled,
    #[serde(rename = "Sent to Audit")]
    SentToAudit,
    #[serde(rename = "Solved")]
    Solved,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Rejected,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
        RequestStatus::SentToAudit,
        RequestStatus::Solved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Approved => "Approved",
            RequestStatus::Rejected => "Rejected",
            RequestStatus::InProgress => "In Progress",
            RequestStatus::Completed => "Completed",
            RequestStatus::Cancelled => "Cancelled",
            RequestStatus::SentToAudit => "Sent to Audit",
            RequestStatus::Solved => "Solved",
        }
    }

    /// Statuses this one may move to. Empty for terminal statuses.
    pub fn successors(&self) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match self {
            Pending => &[Approved, Rejected, Cancelled],
            Approved => &[SentToAudit, InProgress, Completed, Cancelled],
            InProgress => &[Completed, Cancelled],
            SentToAudit => &[Solved, Cancelled],
            Rejected | Completed | Cancelled | Solved => &[],
        }
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Active statuses are the ones a request may still be cancelled from.
    pub fn is_active(&self) -> bool {
        self.can_transition_to(RequestStatus::Cancelled)
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    /// Accepts the display form as well as snake/camel spellings
    /// (`"Sent to Audit"`, `"sent_to_audit"`, `"SentToAudit"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();

        RequestStatus::ALL
            .into_iter()
            .find(|status| {
                status.as_str().replace(' ', "").to_ascii_lowercase() == normalized
            })
            .ok_or_else(|| DomainError::validation(format!("unknown request status '{s}'")))
    }
}
