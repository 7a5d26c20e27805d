//! Participant registry: the single presenter slot and the set of connected
//! respondents.
//!
//! The registry knows nothing about poll content. Entries are created on a
//! successful join and destroyed on disconnect; respondent names are unique
//! (case-insensitively) among *currently connected* respondents only, so a
//! name becomes reusable the moment its owner disconnects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

/// A connected respondent as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondentEntry {
    pub connection_id: Uuid,
    pub name: String,
    pub joined_at: DateTime<Utc>,
    /// Mirrors whether `name` is in the current poll's voter set.
    pub has_voted: bool,
}

#[derive(Debug, Clone, Copy)]
struct PresenterEntry {
    connection_id: Uuid,
}

/// The role-aware result of removing a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departed {
    Presenter,
    Respondent(RespondentEntry),
}

/// Connection-id keyed registry. At most one presenter exists at any time;
/// respondents are kept in join order.
#[derive(Debug, Default)]
pub struct Registry {
    presenter: Option<PresenterEntry>,
    respondents: Vec<RespondentEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the presenter. A prior presenter entry, if any, is evicted and
    /// its connection id returned so the caller can treat it as a disconnect.
    pub fn register_presenter(&mut self, connection_id: Uuid) -> Option<Uuid> {
        let evicted = self.presenter.map(|p| p.connection_id);
        self.presenter = Some(PresenterEntry { connection_id });
        evicted.filter(|&old| old != connection_id)
    }

    /// Whether a name is held by a currently connected respondent
    /// (case-insensitively).
    pub fn name_taken(&self, name: &str) -> bool {
        self.respondents
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Register a respondent, enforcing case-insensitive name uniqueness among
    /// currently connected respondents.
    pub fn register_respondent(
        &mut self,
        connection_id: Uuid,
        name: &str,
    ) -> SessionResult<RespondentEntry> {
        if self.name_taken(name) {
            return Err(SessionError::NameTaken(name.to_string()));
        }
        let entry = RespondentEntry {
            connection_id,
            name: name.to_string(),
            joined_at: Utc::now(),
            has_voted: false,
        };
        self.respondents.push(entry.clone());
        Ok(entry)
    }

    /// Remove a connection, reporting which role it held. No-op for unknown ids.
    pub fn unregister(&mut self, connection_id: Uuid) -> Option<Departed> {
        if self
            .presenter
            .is_some_and(|p| p.connection_id == connection_id)
        {
            self.presenter = None;
            return Some(Departed::Presenter);
        }
        let idx = self
            .respondents
            .iter()
            .position(|r| r.connection_id == connection_id)?;
        Some(Departed::Respondent(self.respondents.remove(idx)))
    }

    pub fn find_respondent(&self, connection_id: Uuid) -> Option<&RespondentEntry> {
        self.respondents
            .iter()
            .find(|r| r.connection_id == connection_id)
    }

    pub fn is_presenter(&self, connection_id: Uuid) -> bool {
        self.presenter
            .is_some_and(|p| p.connection_id == connection_id)
    }

    pub fn presenter_id(&self) -> Option<Uuid> {
        self.presenter.map(|p| p.connection_id)
    }

    /// Snapshot of connected respondents, in join order.
    pub fn respondents(&self) -> Vec<RespondentEntry> {
        self.respondents.clone()
    }

    pub fn respondent_count(&self) -> usize {
        self.respondents.len()
    }

    pub fn set_voted(&mut self, connection_id: Uuid, voted: bool) {
        if let Some(r) = self
            .respondents
            .iter_mut()
            .find(|r| r.connection_id == connection_id)
        {
            r.has_voted = voted;
        }
    }

    /// Mark a respondent's vote flag by name (used by the request/response
    /// mirror, which identifies voters by name rather than connection).
    pub fn set_voted_by_name(&mut self, name: &str, voted: bool) {
        if let Some(r) = self
            .respondents
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(name))
        {
            r.has_voted = voted;
        }
    }

    /// Reset every respondent's vote flag; called when a new poll starts.
    pub fn clear_votes(&mut self) {
        for r in &mut self.respondents {
            r.has_voted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respondents_listed_in_join_order() {
        let mut reg = Registry::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        reg.register_respondent(ids[0], "Ann").unwrap();
        reg.register_respondent(ids[1], "Bo").unwrap();
        reg.register_respondent(ids[2], "Cy").unwrap();
        let names: Vec<String> = reg.respondents().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Ann", "Bo", "Cy"]);
    }

    #[test]
    fn name_taken_tracks_connected_respondents() {
        let mut reg = Registry::new();
        assert!(!reg.name_taken("Ann"));
        let ann = Uuid::new_v4();
        reg.register_respondent(ann, "Ann").unwrap();
        assert!(reg.name_taken("ANN"));
        reg.unregister(ann);
        assert!(!reg.name_taken("Ann"));
    }

    #[test]
    fn name_uniqueness_is_case_insensitive() {
        let mut reg = Registry::new();
        reg.register_respondent(Uuid::new_v4(), "Ann").unwrap();
        let err = reg.register_respondent(Uuid::new_v4(), "ann").unwrap_err();
        assert_eq!(err, SessionError::NameTaken("ann".into()));
    }

    #[test]
    fn freed_name_is_reusable_after_disconnect() {
        let mut reg = Registry::new();
        let ann = Uuid::new_v4();
        reg.register_respondent(ann, "Ann").unwrap();
        assert!(reg.register_respondent(Uuid::new_v4(), "ann").is_err());
        assert!(matches!(
            reg.unregister(ann),
            Some(Departed::Respondent(_))
        ));
        assert!(reg.register_respondent(Uuid::new_v4(), "ann").is_ok());
    }

    #[test]
    fn presenter_join_evicts_prior_presenter() {
        let mut reg = Registry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert_eq!(reg.register_presenter(first), None);
        assert_eq!(reg.register_presenter(second), Some(first));
        assert!(!reg.is_presenter(first));
        assert!(reg.is_presenter(second));
    }

    #[test]
    fn unregister_reports_role_and_ignores_unknown_ids() {
        let mut reg = Registry::new();
        let p = Uuid::new_v4();
        let r = Uuid::new_v4();
        reg.register_presenter(p);
        reg.register_respondent(r, "Ann").unwrap();

        assert_eq!(reg.unregister(p), Some(Departed::Presenter));
        assert_eq!(reg.presenter_id(), None);
        match reg.unregister(r) {
            Some(Departed::Respondent(entry)) => assert_eq!(entry.name, "Ann"),
            other => panic!("unexpected departure: {other:?}"),
        }
        assert_eq!(reg.unregister(Uuid::new_v4()), None);
    }

    #[test]
    fn vote_flags_follow_marks_and_reset() {
        let mut reg = Registry::new();
        let ann = Uuid::new_v4();
        reg.register_respondent(ann, "Ann").unwrap();
        reg.set_voted(ann, true);
        assert!(reg.find_respondent(ann).unwrap().has_voted);
        reg.clear_votes();
        assert!(!reg.find_respondent(ann).unwrap().has_voted);
        reg.set_voted_by_name("ANN", true);
        assert!(reg.find_respondent(ann).unwrap().has_voted);
    }
}
