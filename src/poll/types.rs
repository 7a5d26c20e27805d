//! Wire-facing poll types: status, close reasons and immutable snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a poll. Transitions only ever go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Active,
    Completed,
}

/// Why a poll transitioned to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Every respondent who ever joined the poll has voted.
    AllVoted,
    /// The time limit elapsed.
    TimeExpired,
    /// The presenter ended it (explicitly, or by starting a new poll).
    EndedByPresenter,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::AllVoted => "all respondents voted",
            CloseReason::TimeExpired => "time expired",
            CloseReason::EndedByPresenter => "ended by presenter",
        };
        f.write_str(text)
    }
}

/// One option inside a poll snapshot. Percentages are computed fresh on every
/// `snapshot()` call, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSnapshot {
    pub id: usize,
    pub text: String,
    pub votes: u32,
    /// `round(100 * votes / total_votes)`, or 0 when nobody voted yet.
    pub percentage: u32,
}

/// Immutable view of a poll, safe to hand to any connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<OptionSnapshot>,
    pub total_votes: u32,
    pub total_participants: usize,
    pub status: PollStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
    pub time_limit_secs: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl PollSnapshot {
    pub fn is_active(&self) -> bool {
        self.status == PollStatus::Active
    }
}
