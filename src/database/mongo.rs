use async_trait::async_trait;
use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Collection, Database, IndexModel,
};

use crate::database::store::AuthStore;
use crate::errors::{AppError, Result};
use crate::models::pending_signup::PendingSignup;
use crate::models::user::{Role, User};

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

fn conflict_on_duplicate(err: mongodb::error::Error) -> AppError {
    if is_duplicate_key(&err) {
        AppError::Conflict
    } else {
        AppError::MongoDB(err)
    }
}

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
    users: Collection<User>,
    pending: Collection<PendingSignup>,
    counters: Collection<Document>,
}

impl MongoStore {
    pub async fn new(db: Database) -> Result<Self> {
        let store = MongoStore {
            users: db.collection("users"),
            pending: db.collection("pending_signups"),
            counters: db.collection("counters"),
            db,
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let unique_email = || {
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };
        self.users.create_index(unique_email()).await?;
        self.pending.create_index(unique_email()).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthStore for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.find_one(doc! { "email": email }).await?)
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        self.users
            .insert_one(user)
            .await
            .map_err(conflict_on_duplicate)?;
        Ok(())
    }

    async fn save_user(&self, user: &mut User) -> Result<()> {
        let expected = user.version;
        let mut next = user.clone();
        next.version = expected + 1;

        let filter = doc! { "email": &user.email, "version": expected as i64 };
        let result = self.users.replace_one(filter, &next).await?;
        if result.matched_count == 0 {
            return Err(AppError::Conflict);
        }

        user.version = next.version;
        Ok(())
    }

    async fn find_pending(&self, email: &str) -> Result<Option<PendingSignup>> {
        Ok(self.pending.find_one(doc! { "email": email }).await?)
    }

    async fn save_pending(&self, pending: &mut PendingSignup) -> Result<()> {
        let expected = pending.version;
        let mut next = pending.clone();
        next.version = expected + 1;

        if expected == 0 {
            self.pending
                .insert_one(&next)
                .await
                .map_err(conflict_on_duplicate)?;
        } else {
            let filter = doc! { "email": &pending.email, "version": expected as i64 };
            let result = self.pending.replace_one(filter, &next).await?;
            if result.matched_count == 0 {
                return Err(AppError::Conflict);
            }
        }

        pending.version = next.version;
        Ok(())
    }

    async fn delete_pending(&self, email: &str) -> Result<()> {
        self.pending.delete_one(doc! { "email": email }).await?;
        Ok(())
    }

    async fn next_user_sequence(&self, role: Role) -> Result<u64> {
        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": format!("user_id:{}", role.as_str()) },
                doc! { "$inc": { "seq": 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?;

        counter
            .and_then(|doc| doc.get_i64("seq").ok())
            .map(|seq| seq as u64)
            .ok_or_else(|| AppError::service("user id sequence unavailable"))
    }
}
