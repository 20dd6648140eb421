//! User Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};

use super::duplicate_key_message;
use crate::repository::order_by_ids;
use crate::domain::{User, UserRole};
use crate::error::{PlatformError, Result};
use crate::repository::UserRepository;

pub struct MongoUserRepository {
    collection: Collection<User>,
}

impl MongoUserRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn insert(&self, user: &User) -> Result<()> {
        match self.collection.insert_one(user).await {
            Ok(_) => Ok(()),
            Err(e) => match duplicate_key_message(&e) {
                Some(msg) if msg.contains("username") => {
                    Err(PlatformError::duplicate("User", "username", &user.username))
                }
                Some(_) => Err(PlatformError::duplicate("User", "email", &user.email)),
                None => Err(e.into()),
            },
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self.collection.find(doc! { "_id": { "$in": ids } }).await?;
        let users: Vec<User> = cursor.try_collect().await?;
        Ok(order_by_ids(ids, users))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = crate::domain::user::normalize_email(email);
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>> {
        Ok(self.collection.find_one(doc! { "verificationToken": token }).await?)
    }

    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        Ok(self
            .collection
            .find_one(doc! {
                "resetPasswordToken": token_hash,
                "resetPasswordExpire": { "$gt": bson::DateTime::from_chrono(now) },
            })
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<User>> {
        let cursor = self.collection.find(doc! {}).sort(doc! { "createdAt": -1 }).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_admin_ids(&self) -> Result<Vec<String>> {
        let cursor = self
            .collection
            .find(doc! { "role": UserRole::Admin.as_str() })
            .await?;
        let admins: Vec<User> = cursor.try_collect().await?;
        Ok(admins.into_iter().map(|u| u.id).collect())
    }

    async fn update(&self, user: &User) -> Result<()> {
        self.collection.replace_one(doc! { "_id": &user.id }, user).await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }

    async fn count_by_blocked(&self, blocked: bool) -> Result<u64> {
        Ok(self.collection.count_documents(doc! { "isBlocked": blocked }).await?)
    }

    async fn count_verified(&self) -> Result<u64> {
        Ok(self.collection.count_documents(doc! { "isVerified": true }).await?)
    }
}
