//! Debug capture attached to response messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One key/value entry recorded while orchestrating a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogProperty {
    pub key: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

impl LogProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered debug properties for one response message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugLog {
    pub id: String,
    pub message_id: String,
    pub session_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub property_bag: Vec<LogProperty>,
}

impl DebugLog {
    /// Create an empty log with a fresh id
    pub fn new(
        message_id: impl Into<String>,
        session_id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_id: message_id.into(),
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            property_bag: Vec::new(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.property_bag.push(LogProperty::new(key, value));
    }

    /// Values recorded under `key`, in order
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.property_bag
            .iter()
            .filter(move |p| p.key == key)
            .map(|p| p.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.property_bag.is_empty()
    }
}
