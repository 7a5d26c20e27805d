//! podium: a live polling session coordinator.
//!
//! One presenter runs a sequence of polls against a roster of named
//! respondents; each respondent votes at most once per poll, and a poll closes
//! on full turnout, time expiry or an explicit end. State is held in memory by
//! a single [`coordinator::SessionCoordinator`] and exposed over a WebSocket
//! gateway plus a REST mirror of the same operations.

pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod poll;
pub mod registry;
pub mod rest;
pub mod server;
pub mod validation;
