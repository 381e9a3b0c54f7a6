//! Near-expiration notification as delivered by Event Grid.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single expiration notification.
///
/// `subject` carries the identifier of the application whose secret is about
/// to expire. `data` is passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationEvent {
    pub id: String,
    #[serde(default)]
    pub topic: String,
    pub subject: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_version: Option<String>,
}

impl ExpirationEvent {
    /// Build an event for a manual rotation request.
    pub fn manual(application_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: format!("manual-{}", now.timestamp_millis()),
            topic: "manual".to_string(),
            subject: application_id.to_string(),
            event_type: "Manual.RotationRequested".to_string(),
            event_time: now,
            data: serde_json::Value::Null,
            data_version: None,
            metadata_version: None,
        }
    }

    /// Application identifier carried in the subject.
    ///
    /// Key Vault subjects may be paths such as `/secrets/<name>`; the last
    /// non-empty segment is the identifier.
    pub fn application_id(&self) -> Option<&str> {
        self.subject
            .trim()
            .rsplit('/')
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Delivery {
    Batch(Vec<ExpirationEvent>),
    Single(Box<ExpirationEvent>),
}

/// Parse a delivery payload holding one event or an array of events.
pub fn parse_delivery(payload: &str) -> Result<Vec<ExpirationEvent>> {
    let delivery: Delivery =
        serde_json::from_str(payload).context("parse expiration event payload")?;
    let events = match delivery {
        Delivery::Batch(events) => events,
        Delivery::Single(event) => vec![*event],
    };
    if events.is_empty() {
        bail!("event payload contains no events");
    }
    Ok(events)
}
