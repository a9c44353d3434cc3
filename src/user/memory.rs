//! In-process [`UserRepository`] used as a test double.
//!
//! Mirrors the store contract: UUID identities, one timestamp per write that
//! always moves forward, and a case-insensitive unique email.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::user::{NewUser, User, UserRepository, UserService, format_timestamp};

const EMAIL_CONSTRAINT: &str = "users_email_key";

#[derive(Default)]
pub struct MemoryUserRepository {
    rows: Mutex<HashMap<String, User>>,
    ticks: AtomicI64,
}

impl MemoryUserRepository {
    fn now(&self) -> String {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        format_timestamp(DateTime::<Utc>::default() + Duration::microseconds(tick))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, User>>> {
        self.rows.lock().map_err(|_| ServerError::Internal {
            details: "poisoned store".into(),
            source: None,
        })
    }

    fn email_taken(rows: &HashMap<String, User>, email: &str, except: &str) -> bool {
        rows.values()
            .any(|u| u.id != except && u.email.eq_ignore_ascii_case(email))
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find(&self, id: &str) -> Result<Option<User>> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let mut rows = self.lock()?;
        if Self::email_taken(&rows, &user.email, "") {
            return Err(ServerError::ConstraintViolation {
                constraint: EMAIL_CONSTRAINT.into(),
            });
        }

        let now = self.now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now.clone(),
            updated_at: now,
        };
        rows.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<Option<User>> {
        let mut rows = self.lock()?;
        if Self::email_taken(&rows, &user.email, &user.id) {
            return Err(ServerError::ConstraintViolation {
                constraint: EMAIL_CONSTRAINT.into(),
            });
        }

        let updated_at = self.now();
        Ok(rows.get_mut(&user.id).map(|row| {
            row.username = user.username.clone();
            row.email = user.email.clone();
            row.updated_at = updated_at;
            row.clone()
        }))
    }

    async fn remove(&self, id: &str) -> Result<u64> {
        Ok(self.lock()?.remove(id).map_or(0, |_| 1))
    }
}

/// [`UserService`] over an empty [`MemoryUserRepository`].
pub fn service() -> UserService {
    UserService::new(
        Arc::new(MemoryUserRepository::default()),
        Arc::new(crate::crypto::test_hasher()),
    )
}
