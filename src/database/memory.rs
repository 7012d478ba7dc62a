use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::database::store::AuthStore;
use crate::errors::{AppError, Result};
use crate::models::pending_signup::PendingSignup;
use crate::models::user::{Role, User};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    pending: HashMap<String, PendingSignup>,
    sequences: HashMap<Role, u64>,
}

/// Process-local store with the same compare-and-swap rules as `MongoStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| {
            tracing::warn!("Memory store lock was poisoned, recovering the lock");
            e.into_inner()
        })
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>> {
        Ok(self.tables().users.get(email).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables();
        if tables.users.contains_key(&user.email) {
            return Err(AppError::Conflict);
        }
        tables.users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn save_user(&self, user: &mut User) -> Result<()> {
        let mut tables = self.tables();
        match tables.users.get(&user.email) {
            Some(stored) if stored.version == user.version => {}
            _ => return Err(AppError::Conflict),
        }
        user.version += 1;
        tables.users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn find_pending(&self, email: &str) -> Result<Option<PendingSignup>> {
        Ok(self.tables().pending.get(email).cloned())
    }

    async fn save_pending(&self, pending: &mut PendingSignup) -> Result<()> {
        let mut tables = self.tables();
        let current = tables.pending.get(&pending.email).map(|p| p.version);
        match (pending.version, current) {
            (0, None) => {}
            (expected, Some(stored)) if expected != 0 && expected == stored => {}
            _ => return Err(AppError::Conflict),
        }
        pending.version += 1;
        tables.pending.insert(pending.email.clone(), pending.clone());
        Ok(())
    }

    async fn delete_pending(&self, email: &str) -> Result<()> {
        self.tables().pending.remove(email);
        Ok(())
    }

    async fn next_user_sequence(&self, role: Role) -> Result<u64> {
        let mut tables = self.tables();
        let seq = tables.sequences.entry(role).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }
}
