//! Report Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{bson::doc, options::ReturnDocument, Collection, Database};

use crate::domain::{Report, ReportStatus};
use crate::error::Result;
use crate::repository::ReportRepository;

pub struct MongoReportRepository {
    collection: Collection<Report>,
}

impl MongoReportRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("reports"),
        }
    }
}

#[async_trait]
impl ReportRepository for MongoReportRepository {
    async fn insert(&self, report: &Report) -> Result<()> {
        self.collection.insert_one(report).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Report>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_page(&self, skip: u64, limit: u64) -> Result<(Vec<Report>, u64)> {
        let total = self.collection.count_documents(doc! {}).await?;
        let cursor = self
            .collection
            .find(doc! {})
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .skip(skip)
            .limit(limit as i64)
            .await?;
        Ok((cursor.try_collect().await?, total))
    }

    async fn resolve(&self, id: &str, resolver: &str, at: DateTime<Utc>) -> Result<Option<Report>> {
        let at = bson::DateTime::from_chrono(at);
        Ok(self
            .collection
            .find_one_and_update(
                doc! { "_id": id, "status": ReportStatus::Open.as_str() },
                doc! { "$set": {
                    "status": ReportStatus::Resolved.as_str(),
                    "resolver": resolver,
                    "resolvedAt": at,
                    "updatedAt": at,
                } },
            )
            .return_document(ReturnDocument::After)
            .await?)
    }
}
