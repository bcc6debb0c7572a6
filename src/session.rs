//! In-memory chat sessions.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Display format for session and upload timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One question and the answer it received
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub query: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub history: Vec<Exchange>,
}

/// Listing entry for a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, SessionRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore::default()
    }

    /// Return the id of an existing session, or create it.
    ///
    /// Without an id a fresh UUID is generated.
    pub fn open(&mut self, id: Option<&str>) -> String {
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        self.sessions
            .entry(id.clone())
            .or_insert_with(|| SessionRecord {
                id: id.clone(),
                created_at: Utc::now(),
                history: Vec::new(),
            });

        id
    }

    /// Append an exchange, creating the session if needed
    pub fn record(&mut self, id: &str, query: &str, response: &str) {
        let id = self.open(Some(id));
        if let Some(session) = self.sessions.get_mut(&id) {
            session.history.push(Exchange {
                query: query.to_string(),
                response: response.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    pub fn history(&self, id: &str) -> Option<&[Exchange]> {
        self.sessions.get(id).map(|s| s.history.as_slice())
    }

    /// All sessions, oldest first
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                created_at: s.created_at,
                message_count: s.history.len(),
            })
            .collect();

        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}
