//! Message Repository

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};

use crate::domain::Message;
use crate::error::Result;
use crate::repository::MessageRepository;

pub struct MongoMessageRepository {
    collection: Collection<Message>,
}

impl MongoMessageRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("messages"),
        }
    }
}

#[async_trait]
impl MessageRepository for MongoMessageRepository {
    async fn insert(&self, message: &Message) -> Result<()> {
        self.collection.insert_one(message).await?;
        Ok(())
    }

    async fn find_recent_by_event(&self, event_id: &str, limit: u64) -> Result<Vec<Message>> {
        let cursor = self
            .collection
            .find(doc! { "event": event_id })
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .limit(limit as i64)
            .await?;
        let mut messages: Vec<Message> = cursor.try_collect().await?;
        messages.reverse();
        Ok(messages)
    }

    async fn mark_read_by(&self, event_id: &str, user_id: &str) -> Result<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "event": event_id, "sender": { "$ne": user_id }, "readBy": { "$ne": user_id } },
                doc! { "$addToSet": { "readBy": user_id } },
            )
            .await?;
        Ok(result.modified_count)
    }
}
