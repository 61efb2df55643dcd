use crate::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

pub type ConnectionId = u32;

/// Identity of one connected participant.
///
/// Assigned by the transport layer once per connection. The ordering is total
/// and is what decides negotiation roles between two participants.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub ConnectionId);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const MIN_CODE_LEN: usize = 4;
pub const MAX_CODE_LEN: usize = 8;

/// Normalized session code: upper-case ASCII alphanumerics, 4 to 8 characters.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCode(String);

impl SessionCode {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let code = raw.trim().to_ascii_uppercase();
        let valid_len = code.len() >= MIN_CODE_LEN && code.len() <= MAX_CODE_LEN;
        if valid_len && code.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(Self(code))
        } else {
            Err(SessionError::InvalidCode)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const MAX_NAME_LEN: usize = 20;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    /// Trims surrounding whitespace and keeps at most `MAX_NAME_LEN` characters.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let name: String = raw.trim().chars().take(MAX_NAME_LEN).collect();
        let name = name.trim_end().to_string();
        if name.is_empty() {
            Err(SessionError::InvalidName)
        } else {
            Ok(Self(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Milliseconds on the coordinator's clock.
#[derive(
    Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn saturating_elapsed_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.saturating_elapsed_since(rhs)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl std::default::Default for Color {
    fn default() -> Self {
        Self { r: 0, g: 0, b: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_normalizes_session_code() {
        let code = SessionCode::parse("  abcd ").expect("");
        assert_eq!(code.as_str(), "ABCD");
    }

    #[test]
    fn it_rejects_malformed_session_code() {
        assert_eq!(SessionCode::parse("abc"), Err(SessionError::InvalidCode));
        assert_eq!(SessionCode::parse("ABCDEFGHI"), Err(SessionError::InvalidCode));
        assert_eq!(SessionCode::parse("AB-CD"), Err(SessionError::InvalidCode));
    }

    #[test]
    fn it_trims_and_bounds_display_name() {
        let name = DisplayName::parse("   Alice  ").expect("");
        assert_eq!(name.as_str(), "Alice");

        let long = DisplayName::parse("abcdefghijklmnopqrstuvwxyz").expect("");
        assert_eq!(long.as_str().chars().count(), MAX_NAME_LEN);

        assert_eq!(DisplayName::parse("    "), Err(SessionError::InvalidName));
    }

    #[test]
    fn it_orders_participant_ids_totally() {
        assert!(ParticipantId(3) < ParticipantId(10));
        assert_eq!(ParticipantId(7).max(ParticipantId(2)), ParticipantId(7));
    }
}
