//! Real-time event gateway.
//!
//! Maps inbound connection events to coordinator calls and coordinator state
//! changes to outbound messages. One logical handler per event type, each
//! calling exactly one coordinator operation; failures go back to the
//! originating connection only and never abort anyone else's in-flight work.
//!
//! The gateway also owns the per-poll countdown: a 1 Hz tokio task that reads
//! the remaining time, broadcasts it, and emits the single time-expired
//! poll-ended broadcast. Every wake re-validates the poll's identity, so a
//! stale timer for a superseded poll simply stops.

pub mod broadcast;
pub mod protocol;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::{ChatAuthor, Departure, SessionCoordinator, TickOutcome};
use crate::error::SessionResult;
use crate::poll::CloseReason;
use crate::validation;

use broadcast::{ConnectionManager, OUTBOUND_BUFFER};
use protocol::{ChatEntry, ClientEvent, ServerEvent};

/// Shared handles for both the WebSocket gateway and the REST mirror.
#[derive(Debug, Clone, Default)]
pub struct GatewayContext {
    pub coordinator: Arc<SessionCoordinator>,
    pub connections: Arc<ConnectionManager>,
}

impl GatewayContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Axum handler: upgrade and run the connection until it drops.
pub async fn ws_handler(
    State(ctx): State<GatewayContext>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: GatewayContext) {
    let connection_id = Uuid::new_v4();
    debug!(%connection_id, "connection established");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(OUTBOUND_BUFFER);
    ctx.connections.register(connection_id, tx);

    // Writer task: drains this connection's outbound queue. A stalled socket
    // only ever backs up its own queue.
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let text = Utf8Bytes::from(payload.as_str().to_owned());
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_text(&ctx, connection_id, text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    ctx.connections.unregister(connection_id);
    match ctx.coordinator.leave(connection_id) {
        Some(Departure::Presenter) => {
            ctx.connections.broadcast(&ServerEvent::PresenterLeft);
        }
        Some(Departure::Respondent { entry, roster_size }) => {
            send_to_presenter(
                &ctx,
                &ServerEvent::RespondentDisconnected { entry, roster_size },
            );
        }
        None => {}
    }
    writer.abort();
    debug!(%connection_id, "connection closed");
}

/// Parse one inbound frame and dispatch it.
fn handle_text(ctx: &GatewayContext, connection_id: Uuid, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => handle_event(ctx, connection_id, event),
        Err(error) => {
            debug!(%connection_id, %error, "unparseable client event");
            ctx.connections.send_to(
                connection_id,
                &ServerEvent::Error {
                    message: "unrecognized event".into(),
                },
            );
        }
    }
}

/// One handler per event type; every arm calls exactly one coordinator
/// operation and translates the outcome.
fn handle_event(ctx: &GatewayContext, connection_id: Uuid, event: ClientEvent) {
    match event {
        ClientEvent::JoinPresenter => {
            let joined = ctx.coordinator.join_presenter(connection_id);
            if let Some(evicted) = joined.evicted_presenter {
                info!(old = %evicted, new = %connection_id, "presenter replaced");
            }
            ctx.connections.send_to(
                connection_id,
                &ServerEvent::PresenterJoined {
                    current_poll: joined.current_poll,
                    stats: joined.stats,
                    roster: joined.roster,
                },
            );
        }
        ClientEvent::JoinRespondent { name } => {
            let result = validation::validate_respondent_name(&name)
                .and_then(|name| ctx.coordinator.join_respondent(connection_id, &name));
            match result {
                Ok(joined) => {
                    ctx.connections.send_to(
                        connection_id,
                        &ServerEvent::RespondentJoined {
                            entry: joined.entry.clone(),
                            current_poll: joined.current_poll,
                        },
                    );
                    send_to_presenter(
                        ctx,
                        &ServerEvent::RespondentConnected {
                            entry: joined.entry,
                            roster_size: joined.roster_size,
                        },
                    );
                }
                Err(error) => send_error(ctx, connection_id, &error.to_string()),
            }
        }
        ClientEvent::CreatePoll {
            question,
            options,
            time_limit_secs,
        } => match create_poll_checked(ctx, connection_id, &question, options, time_limit_secs) {
            Ok(snapshot) => {
                let poll_id = snapshot.id;
                ctx.connections
                    .broadcast(&ServerEvent::PollStarted { poll: snapshot });
                spawn_poll_timer(ctx.clone(), poll_id);
            }
            Err(error) => send_error(ctx, connection_id, &error.to_string()),
        },
        ClientEvent::SubmitVote { option_id } => {
            match ctx.coordinator.submit_vote(connection_id, option_id) {
                Ok(outcome) => {
                    ctx.connections.send_to(
                        connection_id,
                        &ServerEvent::VoteAccepted {
                            option_id,
                            poll: outcome.snapshot.clone(),
                        },
                    );
                    ctx.connections.broadcast(&ServerEvent::PollResults {
                        poll: outcome.snapshot.clone(),
                    });
                    if outcome.auto_closed {
                        ctx.connections.broadcast(&ServerEvent::PollEnded {
                            poll: outcome.snapshot,
                            reason: CloseReason::AllVoted.to_string(),
                        });
                    }
                }
                Err(error) => send_error(ctx, connection_id, &error.to_string()),
            }
        }
        ClientEvent::EndPoll => match ctx.coordinator.end_poll(connection_id) {
            Ok((snapshot, reason)) => {
                ctx.connections.broadcast(&ServerEvent::PollEnded {
                    poll: snapshot,
                    reason: reason.to_string(),
                });
            }
            Err(error) => send_error(ctx, connection_id, &error.to_string()),
        },
        ClientEvent::GetHistory => {
            if !ctx.coordinator.is_presenter(connection_id) {
                send_error(
                    ctx,
                    connection_id,
                    &crate::error::SessionError::NotPresenter.to_string(),
                );
                return;
            }
            ctx.connections.send_to(
                connection_id,
                &ServerEvent::History {
                    polls: ctx.coordinator.history(),
                },
            );
        }
        ClientEvent::GetStats => {
            ctx.connections.send_to(
                connection_id,
                &ServerEvent::Stats {
                    stats: ctx.coordinator.stats(),
                },
            );
        }
        ClientEvent::SendChat { text } => {
            let result = validation::validate_chat_text(&text)
                .and_then(|text| Ok((ctx.coordinator.chat_sender(connection_id)?, text)));
            match result {
                Ok((author, text)) => {
                    let (sender, from_presenter) = match author {
                        ChatAuthor::Presenter => ("Presenter".to_string(), true),
                        ChatAuthor::Respondent(name) => (name, false),
                    };
                    ctx.connections.broadcast(&ServerEvent::Chat {
                        entry: ChatEntry {
                            id: Uuid::new_v4(),
                            sender,
                            from_presenter,
                            text,
                            sent_at: Utc::now(),
                        },
                    });
                }
                Err(error) => send_error(ctx, connection_id, &error.to_string()),
            }
        }
    }
}

/// Presenter check plus boundary validation, then the coordinator call.
fn create_poll_checked(
    ctx: &GatewayContext,
    connection_id: Uuid,
    question: &str,
    options: Vec<String>,
    time_limit_secs: Option<u64>,
) -> SessionResult<crate::poll::PollSnapshot> {
    if !ctx.coordinator.is_presenter(connection_id) {
        return Err(crate::error::SessionError::NotPresenter);
    }
    let question = validation::validate_question(question)?;
    let options = validation::validate_options(&options)?;
    let time_limit_secs = validation::validate_time_limit(time_limit_secs)?;
    ctx.coordinator
        .create_poll(&question, options, time_limit_secs)
}

fn send_to_presenter(ctx: &GatewayContext, event: &ServerEvent) {
    if let Some(presenter) = ctx.coordinator.presenter_connection() {
        ctx.connections.send_to(presenter, event);
    }
}

fn send_error(ctx: &GatewayContext, connection_id: Uuid, message: &str) {
    warn!(%connection_id, message, "command failed");
    ctx.connections.send_to(
        connection_id,
        &ServerEvent::Error {
            message: message.to_string(),
        },
    );
}

/// Per-poll countdown: broadcasts `timer-tick` once per second and the single
/// time-expired `poll-ended`. Self-cancels the moment the poll it tracks is no
/// longer the current one.
pub fn spawn_poll_timer(ctx: GatewayContext, poll_id: Uuid) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await; // consume the immediate first tick
        loop {
            interval.tick().await;
            match ctx.coordinator.timer_tick(poll_id) {
                TickOutcome::Stale => break,
                TickOutcome::Running { seconds_remaining } => {
                    ctx.connections.broadcast(&ServerEvent::TimerTick {
                        poll_id,
                        seconds_remaining,
                    });
                }
                TickOutcome::Expired(snapshot) => {
                    ctx.connections.broadcast(&ServerEvent::TimerTick {
                        poll_id,
                        seconds_remaining: 0,
                    });
                    ctx.connections.broadcast(&ServerEvent::PollEnded {
                        poll: snapshot,
                        reason: CloseReason::TimeExpired.to_string(),
                    });
                    break;
                }
            }
        }
        debug!(%poll_id, "poll timer stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    fn attach(ctx: &GatewayContext) -> (Uuid, Receiver<Arc<String>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        ctx.connections.register(id, tx);
        (id, rx)
    }

    fn drain(rx: &mut Receiver<Arc<String>>) -> Vec<serde_json::Value> {
        let mut events = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            events.push(serde_json::from_str(&payload).unwrap());
        }
        events
    }

    fn types(events: &[serde_json::Value]) -> Vec<String> {
        events
            .iter()
            .map(|e| e["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn join_flow_notifies_presenter() {
        let ctx = GatewayContext::new();
        let (presenter, mut presenter_rx) = attach(&ctx);
        let (ann, mut ann_rx) = attach(&ctx);

        handle_event(&ctx, presenter, ClientEvent::JoinPresenter);
        assert_eq!(types(&drain(&mut presenter_rx)), vec!["presenter-joined"]);

        handle_event(
            &ctx,
            ann,
            ClientEvent::JoinRespondent { name: "Ann".into() },
        );
        assert_eq!(types(&drain(&mut ann_rx)), vec!["respondent-joined"]);
        let to_presenter = drain(&mut presenter_rx);
        assert_eq!(types(&to_presenter), vec!["respondent-connected"]);
        assert_eq!(to_presenter[0]["data"]["rosterSize"], 1);
    }

    #[tokio::test]
    async fn invalid_name_is_an_error_to_sender_only() {
        let ctx = GatewayContext::new();
        let (presenter, mut presenter_rx) = attach(&ctx);
        let (conn, mut rx) = attach(&ctx);
        handle_event(&ctx, presenter, ClientEvent::JoinPresenter);
        drain(&mut presenter_rx);

        handle_event(
            &ctx,
            conn,
            ClientEvent::JoinRespondent { name: "!".into() },
        );
        assert_eq!(types(&drain(&mut rx)), vec!["error"]);
        assert!(drain(&mut presenter_rx).is_empty());
    }

    #[tokio::test]
    async fn create_poll_requires_presenter() {
        let ctx = GatewayContext::new();
        let (ann, mut ann_rx) = attach(&ctx);
        handle_event(
            &ctx,
            ann,
            ClientEvent::JoinRespondent { name: "Ann".into() },
        );
        drain(&mut ann_rx);

        handle_event(
            &ctx,
            ann,
            ClientEvent::CreatePoll {
                question: "Pick a color?".into(),
                options: vec!["Red".into(), "Blue".into()],
                time_limit_secs: None,
            },
        );
        let events = drain(&mut ann_rx);
        assert_eq!(types(&events), vec!["error"]);
        assert!(events[0]["data"]["message"]
            .as_str()
            .unwrap()
            .contains("presenter"));
    }

    #[tokio::test]
    async fn vote_flow_broadcasts_results_and_auto_close() {
        let ctx = GatewayContext::new();
        let (presenter, mut presenter_rx) = attach(&ctx);
        let (ann, mut ann_rx) = attach(&ctx);
        let (bo, mut bo_rx) = attach(&ctx);

        handle_event(&ctx, presenter, ClientEvent::JoinPresenter);
        handle_event(
            &ctx,
            ann,
            ClientEvent::JoinRespondent { name: "Ann".into() },
        );
        handle_event(&ctx, bo, ClientEvent::JoinRespondent { name: "Bo".into() });
        handle_event(
            &ctx,
            presenter,
            ClientEvent::CreatePoll {
                question: "Pick a color?".into(),
                options: vec!["Red".into(), "Blue".into()],
                time_limit_secs: Some(10),
            },
        );
        drain(&mut presenter_rx);
        drain(&mut ann_rx);
        drain(&mut bo_rx);

        handle_event(&ctx, ann, ClientEvent::SubmitVote { option_id: 0 });
        let ann_events = drain(&mut ann_rx);
        assert_eq!(types(&ann_events), vec!["vote-accepted", "poll-results"]);
        // Other connections only see the results broadcast.
        assert_eq!(types(&drain(&mut bo_rx)), vec!["poll-results"]);

        handle_event(&ctx, bo, ClientEvent::SubmitVote { option_id: 1 });
        let bo_events = drain(&mut bo_rx);
        assert_eq!(
            types(&bo_events),
            vec!["vote-accepted", "poll-results", "poll-ended"]
        );
        let ended = &bo_events[2]["data"];
        assert_eq!(ended["reason"], "all respondents voted");
        let percentages: Vec<i64> = ended["poll"]["options"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["percentage"].as_i64().unwrap())
            .collect();
        assert_eq!(percentages, vec![50, 50]);
    }

    #[tokio::test]
    async fn double_vote_gets_specific_error() {
        let ctx = GatewayContext::new();
        let (presenter, mut presenter_rx) = attach(&ctx);
        let (ann, mut ann_rx) = attach(&ctx);
        handle_event(&ctx, presenter, ClientEvent::JoinPresenter);
        handle_event(
            &ctx,
            ann,
            ClientEvent::JoinRespondent { name: "Ann".into() },
        );
        let (bo, mut bo_rx) = attach(&ctx);
        handle_event(&ctx, bo, ClientEvent::JoinRespondent { name: "Bo".into() });
        handle_event(
            &ctx,
            presenter,
            ClientEvent::CreatePoll {
                question: "Pick a color?".into(),
                options: vec!["Red".into(), "Blue".into()],
                time_limit_secs: None,
            },
        );
        handle_event(&ctx, ann, ClientEvent::SubmitVote { option_id: 0 });
        drain(&mut ann_rx);
        drain(&mut bo_rx);
        drain(&mut presenter_rx);

        handle_event(&ctx, ann, ClientEvent::SubmitVote { option_id: 1 });
        let events = drain(&mut ann_rx);
        assert_eq!(types(&events), vec!["error"]);
        assert!(events[0]["data"]["message"]
            .as_str()
            .unwrap()
            .contains("already voted"));
        // No broadcast leaked to others.
        assert!(drain(&mut bo_rx).is_empty());
    }

    #[tokio::test]
    async fn chat_is_broadcast_with_author() {
        let ctx = GatewayContext::new();
        let (presenter, mut presenter_rx) = attach(&ctx);
        let (ann, mut ann_rx) = attach(&ctx);
        handle_event(&ctx, presenter, ClientEvent::JoinPresenter);
        handle_event(
            &ctx,
            ann,
            ClientEvent::JoinRespondent { name: "Ann".into() },
        );
        drain(&mut presenter_rx);
        drain(&mut ann_rx);

        handle_event(
            &ctx,
            ann,
            ClientEvent::SendChat {
                text: "hello".into(),
            },
        );
        let events = drain(&mut presenter_rx);
        assert_eq!(types(&events), vec!["chat"]);
        assert_eq!(events[0]["data"]["entry"]["sender"], "Ann");
        assert_eq!(events[0]["data"]["entry"]["fromPresenter"], false);
    }

    #[tokio::test]
    async fn chat_from_unregistered_connection_is_rejected() {
        let ctx = GatewayContext::new();
        let (conn, mut rx) = attach(&ctx);
        handle_event(&ctx, conn, ClientEvent::SendChat { text: "hi".into() });
        assert_eq!(types(&drain(&mut rx)), vec!["error"]);
    }

    #[tokio::test]
    async fn history_is_presenter_only_and_stats_is_open() {
        let ctx = GatewayContext::new();
        let (ann, mut ann_rx) = attach(&ctx);
        handle_event(
            &ctx,
            ann,
            ClientEvent::JoinRespondent { name: "Ann".into() },
        );
        drain(&mut ann_rx);

        handle_event(&ctx, ann, ClientEvent::GetHistory);
        assert_eq!(types(&drain(&mut ann_rx)), vec!["error"]);
        handle_event(&ctx, ann, ClientEvent::GetStats);
        assert_eq!(types(&drain(&mut ann_rx)), vec!["stats"]);
    }

    #[tokio::test]
    async fn malformed_frame_yields_error_event() {
        let ctx = GatewayContext::new();
        let (conn, mut rx) = attach(&ctx);
        handle_text(&ctx, conn, "{not json");
        handle_text(&ctx, conn, r#"{"type":"frobnicate"}"#);
        assert_eq!(types(&drain(&mut rx)), vec!["error", "error"]);
    }
}
