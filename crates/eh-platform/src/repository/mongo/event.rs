//! Event Repository
//!
//! Attendee mutations are single `findOneAndUpdate` calls whose filters
//! carry the registration preconditions, so two concurrent requests can
//! never both take the last seat.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::ReturnDocument,
    Collection, Database,
};

use crate::domain::{Event, EventChanges, EventStatus};
use crate::error::Result;
use crate::repository::{EventQuery, EventRepository};

pub struct MongoEventRepository {
    collection: Collection<Event>,
}

impl MongoEventRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("events"),
        }
    }

    fn build_filter(query: &EventQuery) -> Document {
        let mut filter = Document::new();
        if let Some(status) = query.status {
            filter.insert("status", status.as_str());
        }
        if let Some(category) = query.category {
            filter.insert("category", category.as_str());
        }
        if let Some(from) = query.from_date {
            filter.insert("date", doc! { "$gte": bson::DateTime::from_chrono(from) });
        }
        if let Some(location) = query.location.as_deref().filter(|l| !l.trim().is_empty()) {
            filter.insert(
                "location",
                doc! { "$regex": regex::escape(location.trim()), "$options": "i" },
            );
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            filter.insert("$text", doc! { "$search": search.trim() });
        }
        filter
    }
}

#[async_trait]
impl EventRepository for MongoEventRepository {
    async fn insert(&self, event: &Event) -> Result<()> {
        self.collection.insert_one(event).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn search(&self, query: &EventQuery, skip: u64, limit: u64) -> Result<(Vec<Event>, u64)> {
        let filter = Self::build_filter(query);
        let total = self.collection.count_documents(filter.clone()).await?;
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "date": 1, "_id": 1 })
            .skip(skip)
            .limit(limit as i64)
            .await?;
        Ok((cursor.try_collect().await?, total))
    }

    async fn find_all(&self) -> Result<Vec<Event>> {
        let cursor = self.collection.find(doc! {}).sort(doc! { "createdAt": -1 }).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_creator(&self, user_id: &str) -> Result<Vec<Event>> {
        let cursor = self
            .collection
            .find(doc! { "creator": user_id })
            .sort(doc! { "date": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_attendee(&self, user_id: &str) -> Result<Vec<Event>> {
        let cursor = self
            .collection
            .find(doc! { "attendees": user_id })
            .sort(doc! { "date": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn add_attendee(&self, event_id: &str, user_id: &str) -> Result<Option<Event>> {
        let filter = doc! {
            "_id": event_id,
            "status": EventStatus::Approved.as_str(),
            "attendees": { "$ne": user_id },
            "$expr": { "$lt": [ { "$size": "$attendees" }, "$capacity" ] },
        };
        let update = doc! {
            "$push": { "attendees": user_id },
            "$set": { "updatedAt": bson::DateTime::now() },
        };
        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn remove_attendee(&self, event_id: &str, user_id: &str) -> Result<Option<Event>> {
        let filter = doc! { "_id": event_id, "attendees": user_id };
        let update = doc! {
            "$pull": { "attendees": user_id },
            "$set": { "updatedAt": bson::DateTime::now() },
        };
        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn update_details(&self, event_id: &str, changes: &EventChanges) -> Result<Option<Event>> {
        let mut filter = doc! { "_id": event_id };
        let mut set = doc! { "updatedAt": bson::DateTime::now() };

        if let Some(title) = &changes.title {
            set.insert("title", title.trim());
        }
        if let Some(description) = &changes.description {
            set.insert("description", description.trim());
        }
        if let Some(date) = changes.date {
            set.insert("date", bson::DateTime::from_chrono(date));
        }
        if let Some(location) = &changes.location {
            set.insert("location", location.trim());
        }
        if let Some(category) = changes.category {
            set.insert("category", category.as_str());
        }
        if let Some(capacity) = changes.capacity {
            let capacity = capacity as i64;
            set.insert("capacity", capacity);
            filter.insert("$expr", doc! { "$lte": [ { "$size": "$attendees" }, capacity ] });
        }

        Ok(self
            .collection
            .find_one_and_update(filter, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn set_moderation(
        &self,
        event_id: &str,
        status: EventStatus,
        moderator: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Event>> {
        let at = bson::DateTime::from_chrono(at);
        let mut update = doc! {
            "$set": {
                "status": status.as_str(),
                "moderatedBy": moderator,
                "moderatedAt": at,
                "updatedAt": at,
            },
        };
        match reason {
            Some(reason) => {
                if let Ok(set) = update.get_document_mut("$set") {
                    set.insert("rejectionReason", reason);
                }
            }
            None => {
                update.insert("$unset", doc! { "rejectionReason": "" });
            }
        }

        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": event_id }, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn delete(&self, event_id: &str) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": event_id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .collection
            .count_documents(doc! { "createdAt": { "$gte": bson::DateTime::from_chrono(since) } })
            .await?)
    }
}
