//! Chat Message Entity

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};

pub const MAX_MESSAGE_LENGTH: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,

    /// Event id the message belongs to
    pub event: String,

    /// Sender user id
    pub sender: String,

    pub content: String,

    #[serde(default)]
    pub read_by: Vec<String>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Trims the content and enforces 1..=1000 characters
    pub fn new(event: impl Into<String>, sender: impl Into<String>, content: &str) -> Result<Self> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PlatformError::validation("Message content is required"));
        }
        if content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(PlatformError::validation(format!(
                "Message cannot exceed {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }

        Ok(Self {
            id: crate::TsidGenerator::generate(),
            event: event.into(),
            sender: sender.into(),
            content: content.to_string(),
            read_by: Vec::new(),
            created_at: Utc::now(),
        })
    }
}
