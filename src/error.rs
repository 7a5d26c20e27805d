//! Session error taxonomy.
//!
//! Every coordinator operation returns one of these kinds. All of them are
//! expected, recoverable failures: the gateway reports them to the originating
//! connection and the session keeps running.

use thiserror::Error;

/// Recoverable failures surfaced by the session coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Malformed create-poll payload (bad option count, empty text, duplicates).
    #[error("{0}")]
    InvalidArgument(String),

    /// A new poll may not be created while the current one is still collecting votes.
    #[error("cannot create a new poll: {0}")]
    PollInProgress(String),

    /// The operation needs an active poll and there is none.
    #[error("there is no active poll")]
    NoActivePoll,

    /// Vote arrived after the poll completed.
    #[error("the poll is no longer accepting votes")]
    PollClosed,

    /// The option index does not exist in the current poll.
    #[error("invalid option selected")]
    InvalidOption,

    /// The respondent already cast a vote in this poll.
    #[error("you have already voted in this poll")]
    AlreadyVoted,

    /// The connection is not registered as a respondent.
    #[error("connection is not registered")]
    NotRegistered,

    /// Privileged action attempted by a connection that is not the presenter.
    #[error("only the presenter can do that")]
    NotPresenter,

    /// Another connected respondent already uses this name.
    #[error("the name \"{0}\" is already taken, please choose another")]
    NameTaken(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
