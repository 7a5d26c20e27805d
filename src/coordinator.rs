//! Session coordinator: the single in-memory authority for poll lifecycle,
//! participant registry and vote admission.
//!
//! All session state lives behind one `parking_lot::Mutex`; every operation is
//! exactly one critical section with no I/O or awaits inside. Callers receive
//! owned snapshots, never references into the shared state, so broadcasting to
//! slow connections can never block another participant's vote.
//!
//! The cross-connection invariants enforced here:
//! - at most one poll is `Active` at any time,
//! - at most one vote per respondent name per poll,
//! - at most one presenter connection.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};
use crate::poll::{CloseReason, Poll, PollSnapshot};
use crate::registry::{Departed, Registry, RespondentEntry};

/// Aggregate session statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_polls_created: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_poll: Option<PollSnapshot>,
    pub connected_respondents: usize,
    pub presenter_connected: bool,
    pub history_len: usize,
}

/// A poll snapshot merged with the requesting respondent's own vote status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentPollView {
    #[serde(flatten)]
    pub poll: PollSnapshot,
    pub has_voted: bool,
}

/// Joined-state payload for the presenter connection.
#[derive(Debug, Clone)]
pub struct PresenterJoined {
    pub current_poll: Option<PollSnapshot>,
    pub stats: SessionStats,
    pub roster: Vec<RespondentEntry>,
    /// Connection id of a prior presenter this join evicted, if any.
    pub evicted_presenter: Option<Uuid>,
}

/// Joined-state payload for a respondent connection.
#[derive(Debug, Clone)]
pub struct RespondentJoined {
    pub entry: RespondentEntry,
    pub current_poll: Option<RespondentPollView>,
    pub roster_size: usize,
}

/// Result of a successfully admitted vote.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome {
    pub snapshot: PollSnapshot,
    /// True when this vote completed the turnout and closed the poll.
    pub auto_closed: bool,
}

/// Which role a departing connection held.
#[derive(Debug, Clone)]
pub enum Departure {
    Presenter,
    Respondent {
        entry: RespondentEntry,
        roster_size: usize,
    },
}

/// One wake of the per-poll timer.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// The tracked poll is no longer current (superseded or already archived);
    /// the timer task should stop without emitting anything.
    Stale,
    /// Still counting down.
    Running { seconds_remaining: u64 },
    /// This tick observed expiry: the poll is now closed and archived, and the
    /// caller owns the single poll-ended broadcast.
    Expired(PollSnapshot),
}

/// Resolved author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAuthor {
    Presenter,
    Respondent(String),
}

#[derive(Debug, Default)]
struct SessionState {
    current_poll: Option<Poll>,
    history: Vec<PollSnapshot>,
    registry: Registry,
    polls_created: u64,
}

/// The session coordinator. Explicitly constructed, shared by reference; no
/// process-global state.
#[derive(Debug, Default)]
pub struct SessionCoordinator {
    state: Mutex<SessionState>,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new poll, enforcing the single-active-poll invariant: creation
    /// is allowed only when no poll is active, the active poll has full
    /// turnout, or it has zero participants. A still-current previous poll is
    /// force-closed and archived first.
    pub fn create_poll(
        &self,
        question: &str,
        options: Vec<String>,
        time_limit_secs: u64,
    ) -> SessionResult<PollSnapshot> {
        self.create_poll_at(question, options, time_limit_secs, Utc::now())
    }

    pub fn create_poll_at(
        &self,
        question: &str,
        options: Vec<String>,
        time_limit_secs: u64,
        now: DateTime<Utc>,
    ) -> SessionResult<PollSnapshot> {
        let state = &mut *self.state.lock();
        if let Some(poll) = state.current_poll.as_mut() {
            let _ = poll.remaining_secs(now);
            if poll.is_active() {
                let participants = poll.participant_count();
                let voters = poll.voter_count();
                if participants > 0 && voters < participants {
                    return Err(SessionError::PollInProgress(format!(
                        "{} of {} respondents haven't voted yet",
                        participants - voters,
                        participants
                    )));
                }
            }
        }

        let mut poll = Poll::new(question, options, time_limit_secs, now)?;
        // Everyone already in the room is part of this poll's turnout.
        for respondent in state.registry.respondents() {
            poll.add_participant(&respondent.name);
        }
        if let Some(mut previous) = state.current_poll.take() {
            previous.close(CloseReason::EndedByPresenter, now);
            state.history.push(previous.snapshot());
        }
        state.registry.clear_votes();
        state.polls_created += 1;

        let snapshot = poll.snapshot();
        info!(poll_id = %poll.id(), question = %snapshot.question, "poll created");
        state.current_poll = Some(poll);
        Ok(snapshot)
    }

    /// Register the presenter connection and return the joined-state payload.
    pub fn join_presenter(&self, connection_id: Uuid) -> PresenterJoined {
        let state = &mut *self.state.lock();
        let evicted = state.registry.register_presenter(connection_id);
        if let Some(poll) = state.current_poll.as_mut() {
            let _ = poll.remaining_secs(Utc::now());
        }
        info!(%connection_id, "presenter joined");
        PresenterJoined {
            current_poll: state.current_poll.as_ref().map(Poll::snapshot),
            stats: stats_of(state),
            roster: state.registry.respondents(),
            evicted_presenter: evicted,
        }
    }

    /// Register a respondent connection under `name` and associate it with the
    /// active poll, if any.
    pub fn join_respondent(
        &self,
        connection_id: Uuid,
        name: &str,
    ) -> SessionResult<RespondentJoined> {
        let state = &mut *self.state.lock();
        let mut entry = state.registry.register_respondent(connection_id, name)?;
        let mut current_poll = None;
        if let Some(poll) = state.current_poll.as_mut() {
            let _ = poll.remaining_secs(Utc::now());
            if poll.is_active() {
                poll.add_participant(name);
            }
            // A freed name that voted earlier in this poll stays "voted".
            let has_voted = poll.has_voted(name);
            if has_voted {
                state.registry.set_voted(connection_id, true);
                entry.has_voted = true;
            }
            current_poll = Some(RespondentPollView {
                poll: poll.snapshot(),
                has_voted,
            });
        }
        info!(%connection_id, name, "respondent joined");
        Ok(RespondentJoined {
            entry,
            current_poll,
            roster_size: state.registry.respondent_count(),
        })
    }

    /// Admit a vote from a connected respondent, then auto-close on full
    /// turnout.
    pub fn submit_vote(&self, connection_id: Uuid, option_id: usize) -> SessionResult<VoteOutcome> {
        self.submit_vote_at(connection_id, option_id, Utc::now())
    }

    pub fn submit_vote_at(
        &self,
        connection_id: Uuid,
        option_id: usize,
        now: DateTime<Utc>,
    ) -> SessionResult<VoteOutcome> {
        let state = &mut *self.state.lock();
        let name = state
            .registry
            .find_respondent(connection_id)
            .map(|r| r.name.clone())
            .ok_or(SessionError::NotRegistered)?;
        let outcome = admit_vote(state, None, &name, option_id, now)?;
        state.registry.set_voted(connection_id, true);
        Ok(outcome)
    }

    /// Vote path of the request/response mirror: identified by poll id and
    /// respondent name instead of a live connection. Same admission rules,
    /// same auto-close.
    pub fn submit_vote_by_name(
        &self,
        poll_id: Uuid,
        name: &str,
        option_id: usize,
    ) -> SessionResult<VoteOutcome> {
        let state = &mut *self.state.lock();
        let outcome = admit_vote(state, Some(poll_id), name, option_id, Utc::now())?;
        state.registry.set_voted_by_name(name, true);
        Ok(outcome)
    }

    /// End the current poll on behalf of the presenter connection.
    pub fn end_poll(&self, connection_id: Uuid) -> SessionResult<(PollSnapshot, CloseReason)> {
        let state = &mut *self.state.lock();
        if !state.registry.is_presenter(connection_id) {
            return Err(SessionError::NotPresenter);
        }
        end_current(state, Utc::now())
    }

    /// End the current poll without a presenter check (request/response mirror).
    pub fn end_current_poll(&self) -> SessionResult<(PollSnapshot, CloseReason)> {
        end_current(&mut self.state.lock(), Utc::now())
    }

    /// Remove a connection from the registry, reporting which role left.
    pub fn leave(&self, connection_id: Uuid) -> Option<Departure> {
        let state = &mut *self.state.lock();
        match state.registry.unregister(connection_id)? {
            Departed::Presenter => {
                info!(%connection_id, "presenter left");
                Some(Departure::Presenter)
            }
            Departed::Respondent(entry) => {
                info!(%connection_id, name = %entry.name, "respondent left");
                Some(Departure::Respondent {
                    entry,
                    roster_size: state.registry.respondent_count(),
                })
            }
        }
    }

    /// One wake of the per-poll countdown. Re-validates poll identity so a
    /// stale timer can never touch a newer poll, and archives the poll when it
    /// is the tick that observes expiry.
    pub fn timer_tick(&self, poll_id: Uuid) -> TickOutcome {
        self.timer_tick_at(poll_id, Utc::now())
    }

    pub fn timer_tick_at(&self, poll_id: Uuid, now: DateTime<Utc>) -> TickOutcome {
        let state = &mut *self.state.lock();
        let Some(poll) = state.current_poll.as_mut() else {
            return TickOutcome::Stale;
        };
        if poll.id() != poll_id {
            return TickOutcome::Stale;
        }
        let seconds_remaining = poll.remaining_secs(now);
        if poll.is_active() {
            return TickOutcome::Running { seconds_remaining };
        }
        // Completed but not yet archived: only lazy expiry leaves the poll in
        // this state (every other close archives immediately), so exactly one
        // tick observes the transition and owns the poll-ended broadcast.
        let snapshot = poll.snapshot();
        info!(%poll_id, "poll timer expired");
        state.history.push(snapshot.clone());
        state.current_poll = None;
        TickOutcome::Expired(snapshot)
    }

    pub fn stats(&self) -> SessionStats {
        let state = &mut *self.state.lock();
        if let Some(poll) = state.current_poll.as_mut() {
            let _ = poll.remaining_secs(Utc::now());
        }
        stats_of(state)
    }

    /// Completed polls, oldest first.
    pub fn history(&self) -> Vec<PollSnapshot> {
        self.state.lock().history.clone()
    }

    pub fn current_poll(&self) -> Option<PollSnapshot> {
        let state = &mut *self.state.lock();
        if let Some(poll) = state.current_poll.as_mut() {
            let _ = poll.remaining_secs(Utc::now());
        }
        state.current_poll.as_ref().map(Poll::snapshot)
    }

    pub fn is_presenter(&self, connection_id: Uuid) -> bool {
        self.state.lock().registry.is_presenter(connection_id)
    }

    pub fn presenter_connection(&self) -> Option<Uuid> {
        self.state.lock().registry.presenter_id()
    }

    /// Resolve a connection to a chat author.
    pub fn chat_sender(&self, connection_id: Uuid) -> SessionResult<ChatAuthor> {
        let state = self.state.lock();
        if state.registry.is_presenter(connection_id) {
            return Ok(ChatAuthor::Presenter);
        }
        state
            .registry
            .find_respondent(connection_id)
            .map(|r| ChatAuthor::Respondent(r.name.clone()))
            .ok_or(SessionError::NotRegistered)
    }

    /// Check whether a respondent name is free without registering it.
    pub fn name_available(&self, name: &str) -> SessionResult<()> {
        if self.state.lock().registry.name_taken(name) {
            Err(SessionError::NameTaken(name.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Shared vote admission for both the connection path and the mirror path.
/// Runs the lazy expiry check first so a stalled timer can never let a vote
/// slip past the deadline.
fn admit_vote(
    state: &mut SessionState,
    expected_poll: Option<Uuid>,
    name: &str,
    option_id: usize,
    now: DateTime<Utc>,
) -> SessionResult<VoteOutcome> {
    let (snapshot, auto_closed) = {
        let poll = state
            .current_poll
            .as_mut()
            .ok_or(SessionError::NoActivePoll)?;
        if expected_poll.is_some_and(|id| id != poll.id()) {
            return Err(SessionError::NoActivePoll);
        }
        let _ = poll.remaining_secs(now);
        poll.record_vote(option_id, name)?;
        info!(poll_id = %poll.id(), voter = name, option_id, "vote recorded");
        let auto_closed = poll.all_voted();
        if auto_closed {
            poll.close(CloseReason::AllVoted, now);
            info!(poll_id = %poll.id(), "poll auto-closed: all respondents voted");
        }
        (poll.snapshot(), auto_closed)
    };
    if auto_closed {
        state.history.push(snapshot.clone());
        state.current_poll = None;
    }
    Ok(VoteOutcome {
        snapshot,
        auto_closed,
    })
}

fn end_current(
    state: &mut SessionState,
    now: DateTime<Utc>,
) -> SessionResult<(PollSnapshot, CloseReason)> {
    let mut poll = state.current_poll.take().ok_or(SessionError::NoActivePoll)?;
    // Idempotent close: if expiry already closed it, the original reason wins.
    poll.close(CloseReason::EndedByPresenter, now);
    let reason = poll.close_reason().unwrap_or(CloseReason::EndedByPresenter);
    let snapshot = poll.snapshot();
    info!(poll_id = %poll.id(), %reason, "poll ended");
    state.history.push(snapshot.clone());
    Ok((snapshot, reason))
}

fn stats_of(state: &SessionState) -> SessionStats {
    SessionStats {
        total_polls_created: state.polls_created,
        active_poll: state
            .current_poll
            .as_ref()
            .filter(|p| p.is_active())
            .map(Poll::snapshot),
        connected_respondents: state.registry.respondent_count(),
        presenter_connected: state.registry.presenter_id().is_some(),
        history_len: state.history.len(),
    }
}
