//! Security-log entry types
//!
//! Denied filesystem requests are appended to `/security.log` as one JSON
//! object per line, carrying the actor, the target, the attempted mode, and
//! the wall-clock time when the real-time clock has been set.

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// What kind of violation is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogAction {
    /// Nine-bit permission check denied the request
    PermissionDenied,
    /// Read on a write-only stream or write on a read-only stream
    WrongDirection,
    /// Rewind attempted on an append-mode stream
    AppendRewind,
    /// Non-administrator attempted to read or purge the log
    LogAccess,
}

/// One security-log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Wall-clock seconds, when the clock has been set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    /// Acting user name
    pub user: String,
    pub action: LogAction,
    /// File, device, or stream name the request was aimed at
    pub target: String,
    /// Mode letter of the attempt, when one applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<char>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn entries_serialize_as_single_json_objects() {
        let entry = LogEntry {
            time: None,
            user: "USR0".to_string(),
            action: LogAction::PermissionDenied,
            target: "/notes".to_string(),
            mode: Some('w'),
        };
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("\"USR0\""));
        assert!(line.contains("\"/notes\""));
        assert!(!line.contains("time"));
        let back: LogEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn timestamp_appears_when_clock_is_set() {
        let entry = LogEntry {
            time: Some(1_700_000_000),
            user: "kim".to_string(),
            action: LogAction::AppendRewind,
            target: "log".to_string(),
            mode: None,
        };
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("1700000000"));
    }
}
