//! Index bootstrap
//!
//! Unique indexes on users back the email and username constraints;
//! the rest serve the listing and lookup queries.

use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};
use tracing::info;

use crate::error::Result;

fn index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}

fn unique_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).unique(true).build())
        .build()
}

/// Create all indexes; safe to call on every startup
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    db.collection::<Document>("users")
        .create_indexes(vec![
            unique_index(doc! { "email": 1 }, "uniq_email"),
            unique_index(doc! { "username": 1 }, "uniq_username"),
            index(doc! { "verificationToken": 1 }, "idx_verification_token"),
            index(doc! { "resetPasswordToken": 1 }, "idx_reset_token"),
        ])
        .await?;

    db.collection::<Document>("events")
        .create_indexes(vec![
            index(doc! { "title": "text", "description": "text" }, "idx_text_search"),
            index(doc! { "status": 1, "date": 1 }, "idx_status_date"),
            index(doc! { "category": 1 }, "idx_category"),
            index(doc! { "creator": 1 }, "idx_creator"),
            index(doc! { "attendees": 1 }, "idx_attendees"),
        ])
        .await?;

    db.collection::<Document>("notifications")
        .create_indexes(vec![index(doc! { "user": 1, "createdAt": -1 }, "idx_user_time")])
        .await?;

    db.collection::<Document>("messages")
        .create_indexes(vec![index(doc! { "event": 1, "createdAt": -1 }, "idx_event_time")])
        .await?;

    db.collection::<Document>("reports")
        .create_indexes(vec![index(doc! { "status": 1, "createdAt": -1 }, "idx_status_time")])
        .await?;

    info!("MongoDB indexes ensured");
    Ok(())
}
