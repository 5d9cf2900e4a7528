//! User lookups for handshake and booking authority checks.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use parking_lot::Mutex;

use super::pool::DbPool;
use super::schema::users;
use super::StoreError;
use crate::models::user::User;

/// Read access to user records.
///
/// Backed by PostgreSQL in production and an in-memory map in tests.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
}

pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await?;
        let user = diesel_async::RunQueryDsl::get_result(
            users::table.find(user_id).select(User::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(user)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (local development / tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.lock().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().get(user_id).cloned())
    }
}
