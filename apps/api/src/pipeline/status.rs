//! Opportunity and application state machines.
//!
//! Statuses are stored as snake_case TEXT. Every persisted change goes through a
//! compare-and-set on the expected current status, so the transition tables
//! here are the only place that decides what may follow what.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind} status '{value}'")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Identified,
    Reviewing,
    Applying,
    Applied,
    Rejected,
    Expired,
}

impl OpportunityStatus {
    pub const ALL: [OpportunityStatus; 6] = [
        OpportunityStatus::Identified,
        OpportunityStatus::Reviewing,
        OpportunityStatus::Applying,
        OpportunityStatus::Applied,
        OpportunityStatus::Rejected,
        OpportunityStatus::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OpportunityStatus::Identified => "identified",
            OpportunityStatus::Reviewing => "reviewing",
            OpportunityStatus::Applying => "applying",
            OpportunityStatus::Applied => "applied",
            OpportunityStatus::Rejected => "rejected",
            OpportunityStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OpportunityStatus::Applied | OpportunityStatus::Rejected | OpportunityStatus::Expired
        )
    }

    pub fn can_transition(self, to: OpportunityStatus) -> bool {
        use OpportunityStatus::*;
        matches!(
            (self, to),
            (Identified, Reviewing | Applying | Rejected | Expired)
                | (Reviewing, Applying | Rejected | Expired)
                | (Applying, Applied | Rejected | Reviewing)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    PendingApproval,
    Approved,
    /// Claimed by exactly one submitter; the hand-off outcome is not yet recorded.
    Submitting,
    Submitted,
    UnderReview,
    Interviewing,
    Offered,
    Accepted,
    Declined,
    Rejected,
    Failed,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 12] = [
        ApplicationStatus::Draft,
        ApplicationStatus::PendingApproval,
        ApplicationStatus::Approved,
        ApplicationStatus::Submitting,
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Interviewing,
        ApplicationStatus::Offered,
        ApplicationStatus::Accepted,
        ApplicationStatus::Declined,
        ApplicationStatus::Rejected,
        ApplicationStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::PendingApproval => "pending_approval",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Submitting => "submitting",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Interviewing => "interviewing",
            ApplicationStatus::Offered => "offered",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Declined => "declined",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Accepted | ApplicationStatus::Declined | ApplicationStatus::Rejected
        )
    }

    /// Statuses a user may report after the application left our hands.
    pub fn is_tracking(self) -> bool {
        matches!(
            self,
            ApplicationStatus::UnderReview
                | ApplicationStatus::Interviewing
                | ApplicationStatus::Offered
                | ApplicationStatus::Accepted
                | ApplicationStatus::Declined
                | ApplicationStatus::Rejected
        )
    }

    /// True once the application has been handed off (or is being handed off).
    pub fn is_submitted_or_later(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitting
                | ApplicationStatus::Submitted
                | ApplicationStatus::UnderReview
                | ApplicationStatus::Interviewing
                | ApplicationStatus::Offered
                | ApplicationStatus::Accepted
                | ApplicationStatus::Declined
        )
    }

    pub fn can_transition(self, to: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, to),
            (Draft, PendingApproval | Approved | Failed)
                | (PendingApproval, Approved | Rejected)
                | (Approved, Submitting | Rejected)
                | (Submitting, Submitted | Failed)
                | (Submitted, UnderReview | Interviewing | Rejected)
                | (UnderReview, Interviewing | Offered | Rejected)
                | (Interviewing, Offered | Rejected)
                | (Offered, Accepted | Declined)
                | (Failed, Approved)
        )
    }
}

macro_rules! status_text {
    ($ty:ty, $kind:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|status| status.as_str() == s)
                    .ok_or_else(|| UnknownStatus {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

status_text!(OpportunityStatus, "opportunity");
status_text!(ApplicationStatus, "application");
