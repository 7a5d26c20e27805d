//! Boundary validation for inbound payloads.
//!
//! These checks run before data reaches the coordinator: length limits,
//! character sets and the create-poll shape. The coordinator itself only
//! re-checks structural constraints (option count, non-empty) defensively.

use crate::error::{SessionError, SessionResult};

pub const QUESTION_MIN_LEN: usize = 5;
pub const QUESTION_MAX_LEN: usize = 500;
pub const OPTION_MAX_LEN: usize = 200;
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 50;
pub const CHAT_MAX_LEN: usize = 1000;
pub const TIME_LIMIT_MIN_SECS: u64 = 10;
pub const TIME_LIMIT_MAX_SECS: u64 = 300;
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 60;

/// Trim and bound-check a poll question.
pub fn validate_question(question: &str) -> SessionResult<String> {
    let trimmed = question.trim();
    if trimmed.chars().count() < QUESTION_MIN_LEN {
        return Err(SessionError::InvalidArgument(format!(
            "question must be at least {QUESTION_MIN_LEN} characters"
        )));
    }
    if trimmed.chars().count() > QUESTION_MAX_LEN {
        return Err(SessionError::InvalidArgument(format!(
            "question must not exceed {QUESTION_MAX_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim options and check count, per-option length and case-insensitive
/// uniqueness.
pub fn validate_options(options: &[String]) -> SessionResult<Vec<String>> {
    let trimmed: Vec<String> = options.iter().map(|o| o.trim().to_string()).collect();
    if trimmed.len() < 2 || trimmed.len() > 6 {
        return Err(SessionError::InvalidArgument(
            "between 2 and 6 options are required".into(),
        ));
    }
    for (i, option) in trimmed.iter().enumerate() {
        if option.is_empty() {
            return Err(SessionError::InvalidArgument(format!(
                "option {} must not be empty",
                i + 1
            )));
        }
        if option.chars().count() > OPTION_MAX_LEN {
            return Err(SessionError::InvalidArgument(format!(
                "option {} must not exceed {OPTION_MAX_LEN} characters",
                i + 1
            )));
        }
    }
    let mut seen = std::collections::BTreeSet::new();
    for option in &trimmed {
        if !seen.insert(option.to_lowercase()) {
            return Err(SessionError::InvalidArgument(
                "duplicate options are not allowed".into(),
            ));
        }
    }
    Ok(trimmed)
}

/// Respondent names: 2–50 characters, letters/digits/spaces only.
pub fn validate_respondent_name(name: &str) -> SessionResult<String> {
    let trimmed = name.trim();
    if trimmed.chars().count() < NAME_MIN_LEN {
        return Err(SessionError::InvalidArgument(format!(
            "name must be at least {NAME_MIN_LEN} characters"
        )));
    }
    if trimmed.chars().count() > NAME_MAX_LEN {
        return Err(SessionError::InvalidArgument(format!(
            "name must not exceed {NAME_MAX_LEN} characters"
        )));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ')
    {
        return Err(SessionError::InvalidArgument(
            "name can only contain letters, numbers and spaces".into(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Chat messages: non-empty after trim, at most 1000 characters.
pub fn validate_chat_text(text: &str) -> SessionResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidArgument(
            "message must not be empty".into(),
        ));
    }
    if trimmed.chars().count() > CHAT_MAX_LEN {
        return Err(SessionError::InvalidArgument(format!(
            "message must not exceed {CHAT_MAX_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Time limit: 10–300 seconds inclusive, defaulting to 60 when omitted.
pub fn validate_time_limit(secs: Option<u64>) -> SessionResult<u64> {
    let secs = secs.unwrap_or(DEFAULT_TIME_LIMIT_SECS);
    if !(TIME_LIMIT_MIN_SECS..=TIME_LIMIT_MAX_SECS).contains(&secs) {
        return Err(SessionError::InvalidArgument(format!(
            "time limit must be between {TIME_LIMIT_MIN_SECS} and {TIME_LIMIT_MAX_SECS} seconds"
        )));
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_bounds() {
        assert!(validate_question("Hey?").is_err());
        assert_eq!(validate_question("  Pick a color?  ").unwrap(), "Pick a color?");
        assert!(validate_question(&"x".repeat(501)).is_err());
    }

    #[test]
    fn option_bounds_and_uniqueness() {
        assert!(validate_options(&["only one".into()]).is_err());
        assert!(validate_options(&(0..7).map(|i| format!("o{i}")).collect::<Vec<_>>()).is_err());
        assert!(validate_options(&["A".into(), "  ".into()]).is_err());
        assert!(validate_options(&["Red".into(), " red ".into()]).is_err());
        assert_eq!(
            validate_options(&[" Red ".into(), "Blue".into()]).unwrap(),
            vec!["Red", "Blue"]
        );
    }

    #[test]
    fn name_charset_and_bounds() {
        assert!(validate_respondent_name("A").is_err());
        assert!(validate_respondent_name("Ann<script>").is_err());
        assert!(validate_respondent_name(&"n".repeat(51)).is_err());
        assert_eq!(validate_respondent_name(" Ann B 2 ").unwrap(), "Ann B 2");
    }

    #[test]
    fn chat_bounds() {
        assert!(validate_chat_text("   ").is_err());
        assert!(validate_chat_text(&"m".repeat(1001)).is_err());
        assert_eq!(validate_chat_text(" hi ").unwrap(), "hi");
    }

    #[test]
    fn time_limit_bounds_and_default() {
        assert_eq!(validate_time_limit(None).unwrap(), 60);
        assert_eq!(validate_time_limit(Some(10)).unwrap(), 10);
        assert_eq!(validate_time_limit(Some(300)).unwrap(), 300);
        assert!(validate_time_limit(Some(9)).is_err());
        assert!(validate_time_limit(Some(301)).is_err());
    }
}
