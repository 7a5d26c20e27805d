//! Wire protocol: closed tagged-variant types for every inbound and outbound
//! event.
//!
//! Each variant carries a fully-typed payload, so the gateway's dispatch is an
//! exhaustive `match` and forgetting a handler is a compile-time error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::{RespondentPollView, SessionStats};
use crate::poll::PollSnapshot;
use crate::registry::RespondentEntry;

/// Events a client may send over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinPresenter,
    #[serde(rename_all = "camelCase")]
    JoinRespondent { name: String },
    #[serde(rename_all = "camelCase")]
    CreatePoll {
        question: String,
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_limit_secs: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    SubmitVote { option_id: usize },
    EndPoll,
    GetHistory,
    GetStats,
    #[serde(rename_all = "camelCase")]
    SendChat { text: String },
}

/// A chat message fanned out to every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub id: Uuid,
    pub sender: String,
    pub from_presenter: bool,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Events the gateway sends to clients, individually or as broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// To the joining presenter only.
    #[serde(rename_all = "camelCase")]
    PresenterJoined {
        #[serde(skip_serializing_if = "Option::is_none")]
        current_poll: Option<PollSnapshot>,
        stats: SessionStats,
        roster: Vec<RespondentEntry>,
    },
    /// To the joining respondent only.
    #[serde(rename_all = "camelCase")]
    RespondentJoined {
        entry: RespondentEntry,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_poll: Option<RespondentPollView>,
    },
    /// To the presenter, when a respondent connects.
    #[serde(rename_all = "camelCase")]
    RespondentConnected {
        entry: RespondentEntry,
        roster_size: usize,
    },
    /// To the presenter, when a respondent disconnects.
    #[serde(rename_all = "camelCase")]
    RespondentDisconnected {
        entry: RespondentEntry,
        roster_size: usize,
    },
    /// To all, when the presenter disconnects.
    PresenterLeft,
    /// To all, when a poll becomes current.
    #[serde(rename_all = "camelCase")]
    PollStarted { poll: PollSnapshot },
    /// To the voter only, confirming their vote landed.
    #[serde(rename_all = "camelCase")]
    VoteAccepted { option_id: usize, poll: PollSnapshot },
    /// To all, after every accepted vote.
    #[serde(rename_all = "camelCase")]
    PollResults { poll: PollSnapshot },
    /// To all, once per second while a poll runs.
    #[serde(rename_all = "camelCase")]
    TimerTick {
        poll_id: Uuid,
        seconds_remaining: u64,
    },
    /// To all, exactly once per completed poll.
    #[serde(rename_all = "camelCase")]
    PollEnded { poll: PollSnapshot, reason: String },
    /// To the requester.
    #[serde(rename_all = "camelCase")]
    History { polls: Vec<PollSnapshot> },
    /// To the requester.
    #[serde(rename_all = "camelCase")]
    Stats { stats: SessionStats },
    /// To all.
    #[serde(rename_all = "camelCase")]
    Chat { entry: ChatEntry },
    /// To the originating connection only; failures never broadcast.
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_deserialize_from_tagged_json() {
        let ev: ClientEvent = serde_json::from_str(r#"{"type":"join-presenter"}"#).unwrap();
        assert_eq!(ev, ClientEvent::JoinPresenter);

        let ev: ClientEvent =
            serde_json::from_str(r#"{"type":"join-respondent","data":{"name":"Ann"}}"#).unwrap();
        assert_eq!(ev, ClientEvent::JoinRespondent { name: "Ann".into() });

        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"create-poll","data":{"question":"Pick a color?","options":["Red","Blue"],"timeLimitSecs":30}}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            ClientEvent::CreatePoll {
                question: "Pick a color?".into(),
                options: vec!["Red".into(), "Blue".into()],
                time_limit_secs: Some(30),
            }
        );

        // Time limit is optional.
        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"create-poll","data":{"question":"Q?","options":["A","B"]}}"#,
        )
        .unwrap();
        assert!(matches!(
            ev,
            ClientEvent::CreatePoll {
                time_limit_secs: None,
                ..
            }
        ));

        let ev: ClientEvent =
            serde_json::from_str(r#"{"type":"submit-vote","data":{"optionId":1}}"#).unwrap();
        assert_eq!(ev, ClientEvent::SubmitVote { option_id: 1 });
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"frobnicate"}"#).is_err());
    }

    #[test]
    fn server_events_serialize_with_type_tag() {
        let tick = ServerEvent::TimerTick {
            poll_id: Uuid::nil(),
            seconds_remaining: 42,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&tick).unwrap()).unwrap();
        assert_eq!(json["type"], "timer-tick");
        assert_eq!(json["data"]["secondsRemaining"], 42);

        let err = ServerEvent::Error {
            message: "nope".into(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&err).unwrap()).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["message"], "nope");
    }

    #[test]
    fn poll_ended_carries_human_readable_reason() {
        use crate::poll::CloseReason;
        let poll = crate::poll::Poll::new(
            "Pick a color?",
            vec!["Red".into(), "Blue".into()],
            60,
            Utc::now(),
        )
        .unwrap();
        let ev = ServerEvent::PollEnded {
            poll: poll.snapshot(),
            reason: CloseReason::TimeExpired.to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&ev).unwrap()).unwrap();
        assert_eq!(json["data"]["reason"], "time expired");
        assert_eq!(json["data"]["poll"]["status"], "active");
    }
}
