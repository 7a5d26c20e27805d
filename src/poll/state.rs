//! The poll state machine: creation, vote admission, idempotent close and
//! lazy expiry.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

use super::types::{CloseReason, OptionSnapshot, PollSnapshot, PollStatus};

pub(crate) const MIN_OPTIONS: usize = 2;
pub(crate) const MAX_OPTIONS: usize = 6;

#[derive(Debug, Clone)]
struct PollOption {
    id: usize,
    text: String,
    votes: u32,
    voters: BTreeSet<String>,
}

/// One question with its options, tally and lifecycle state.
///
/// Invariant: `total_votes() == Σ option.votes == |voter_names|`; votes are
/// only ever recorded through [`Poll::record_vote`].
#[derive(Debug, Clone)]
pub struct Poll {
    id: Uuid,
    question: String,
    options: Vec<PollOption>,
    status: PollStatus,
    close_reason: Option<CloseReason>,
    time_limit_secs: u64,
    created_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    /// Every respondent name ever associated with this poll. Grows only.
    participant_names: BTreeSet<String>,
    /// Names that already voted. Grows only, subset of `participant_names`.
    voter_names: BTreeSet<String>,
}

impl Poll {
    /// Create a new active poll. The clock is injected so callers (and tests)
    /// control "now"; production code passes `Utc::now()`.
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        time_limit_secs: u64,
        now: DateTime<Utc>,
    ) -> SessionResult<Self> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(SessionError::InvalidArgument(
                "question must not be empty".into(),
            ));
        }
        if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
            return Err(SessionError::InvalidArgument(format!(
                "a poll needs between {MIN_OPTIONS} and {MAX_OPTIONS} options, got {}",
                options.len()
            )));
        }
        if time_limit_secs == 0 {
            return Err(SessionError::InvalidArgument(
                "time limit must be positive".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for text in &options {
            if text.trim().is_empty() {
                return Err(SessionError::InvalidArgument(
                    "option text must not be empty".into(),
                ));
            }
            if !seen.insert(text.trim().to_lowercase()) {
                return Err(SessionError::InvalidArgument(format!(
                    "duplicate option \"{}\"",
                    text.trim()
                )));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            question,
            options: options
                .into_iter()
                .enumerate()
                .map(|(id, text)| PollOption {
                    id,
                    text,
                    votes: 0,
                    voters: BTreeSet::new(),
                })
                .collect(),
            status: PollStatus::Active,
            close_reason: None,
            time_limit_secs,
            created_at: now,
            started_at: now,
            ended_at: None,
            participant_names: BTreeSet::new(),
            voter_names: BTreeSet::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.status == PollStatus::Active
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn total_votes(&self) -> u32 {
        self.options.iter().map(|o| o.votes).sum()
    }

    pub fn participant_count(&self) -> usize {
        self.participant_names.len()
    }

    pub fn voter_count(&self) -> usize {
        self.voter_names.len()
    }

    pub fn has_voted(&self, name: &str) -> bool {
        self.voter_names.contains(name)
    }

    /// Whether every participant has voted. False while nobody has joined.
    pub fn all_voted(&self) -> bool {
        !self.participant_names.is_empty()
            && self.voter_names.len() == self.participant_names.len()
    }

    /// Record one vote. The duplicate check and the tally update happen in the
    /// same call, so there is no lost-update window for a given `&mut self`.
    pub fn record_vote(&mut self, option_id: usize, voter_name: &str) -> SessionResult<()> {
        if self.voter_names.contains(voter_name) {
            return Err(SessionError::AlreadyVoted);
        }
        if self.status != PollStatus::Active {
            return Err(SessionError::PollClosed);
        }
        let option = self
            .options
            .get_mut(option_id)
            .ok_or(SessionError::InvalidOption)?;
        option.votes += 1;
        option.voters.insert(voter_name.to_string());
        self.voter_names.insert(voter_name.to_string());
        self.participant_names.insert(voter_name.to_string());
        Ok(())
    }

    /// Associate a respondent with this poll. Idempotent; never removed.
    pub fn add_participant(&mut self, name: &str) {
        self.participant_names.insert(name.to_string());
    }

    /// Transition to `Completed`. Idempotent: redundant calls from the timer
    /// path and the all-voted path racing each other are no-ops, and only the
    /// first caller sets `ended_at` and the reason.
    ///
    /// Returns `true` when this call performed the transition.
    pub fn close(&mut self, reason: CloseReason, now: DateTime<Utc>) -> bool {
        if self.status == PollStatus::Completed {
            return false;
        }
        self.status = PollStatus::Completed;
        self.close_reason = Some(reason);
        self.ended_at = Some(now);
        true
    }

    /// Seconds left before the time limit elapses.
    ///
    /// Lazy expiry: when this evaluates to 0 while the poll is still active,
    /// the read itself closes the poll. Every status check is therefore
    /// self-correcting even if the timer task is delayed or never fires.
    pub fn remaining_secs(&mut self, now: DateTime<Utc>) -> u64 {
        if self.status == PollStatus::Completed {
            return 0;
        }
        let elapsed = (now - self.started_at).num_seconds().max(0) as u64;
        let remaining = self.time_limit_secs.saturating_sub(elapsed);
        if remaining == 0 {
            self.close(CloseReason::TimeExpired, now);
        }
        remaining
    }

    /// Immutable view with freshly computed percentages.
    pub fn snapshot(&self) -> PollSnapshot {
        let total = self.total_votes();
        PollSnapshot {
            id: self.id,
            question: self.question.clone(),
            options: self
                .options
                .iter()
                .map(|o| OptionSnapshot {
                    id: o.id,
                    text: o.text.clone(),
                    votes: o.votes,
                    percentage: if total > 0 {
                        ((f64::from(o.votes) / f64::from(total)) * 100.0).round() as u32
                    } else {
                        0
                    },
                })
                .collect(),
            total_votes: total,
            total_participants: self.participant_names.len(),
            status: self.status,
            close_reason: self.close_reason,
            time_limit_secs: self.time_limit_secs,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}
