use async_trait::async_trait;

use crate::errors::Result;
use crate::models::pending_signup::PendingSignup;
use crate::models::user::{Role, User};

/// Record store used by the auth flows.
///
/// `save_*` are compare-and-swap writes: they succeed only if the stored
/// `version` still equals the one on the record passed in, and they bump it.
/// A lost race surfaces as `AppError::Conflict`.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn find_user(&self, email: &str) -> Result<Option<User>>;
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn save_user(&self, user: &mut User) -> Result<()>;

    async fn find_pending(&self, email: &str) -> Result<Option<PendingSignup>>;
    /// Inserts when `version == 0`, otherwise compare-and-swap.
    async fn save_pending(&self, pending: &mut PendingSignup) -> Result<()>;
    async fn delete_pending(&self, email: &str) -> Result<()>;

    /// Next value of the per-role user id sequence, starting at 1.
    async fn next_user_sequence(&self, role: Role) -> Result<u64>;
}
