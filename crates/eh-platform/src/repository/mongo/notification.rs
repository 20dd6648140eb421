//! Notification Repository

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::ReturnDocument, Collection, Database};

use crate::domain::Notification;
use crate::error::Result;
use crate::repository::NotificationRepository;

pub struct MongoNotificationRepository {
    collection: Collection<Notification>,
}

impl MongoNotificationRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("notifications"),
        }
    }
}

#[async_trait]
impl NotificationRepository for MongoNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.collection.insert_one(notification).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Notification>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        let cursor = self
            .collection
            .find(doc! { "user": user_id })
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn mark_read(&self, id: &str) -> Result<Option<Notification>> {
        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": { "read": true } })
            .return_document(ReturnDocument::After)
            .await?)
    }
}
