use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Running,
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Running => write!(f, "running"),
            SyncState::Error => write!(f, "error"),
        }
    }
}

/// Per-subject sync bookkeeping: idle -> running -> {idle, error}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncStatusRecord {
    pub subject: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub state: SyncState,
    pub last_error: Option<String>,
}

impl SyncStatusRecord {
    pub fn idle(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            last_success_at: None,
            state: SyncState::Idle,
            last_error: None,
        }
    }

    pub fn start(mut self) -> Self {
        self.state = SyncState::Running;
        self
    }

    pub fn succeed(mut self, at: DateTime<Utc>) -> Self {
        self.state = SyncState::Idle;
        self.last_success_at = Some(at);
        self.last_error = None;
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.state = SyncState::Error;
        self.last_error = Some(error.into());
        self
    }
}
