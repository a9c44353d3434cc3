//! Handle database requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::user::{NewUser, User, format_timestamp};

/// Port for user persistence. The only way to reach the entity store.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by its identifier.
    async fn find(&self, id: &str) -> Result<Option<User>>;

    /// Insert a new user, returning it with store-assigned fields.
    async fn insert(&self, user: NewUser) -> Result<User>;

    /// Persist mutable fields of `user` and refresh `updated_at`.
    ///
    /// Returns `None` if the row no longer exists.
    async fn save(&self, user: &User) -> Result<Option<User>>;

    /// Physically delete a user. Returns the number of removed rows.
    async fn remove(&self, id: &str) -> Result<u64>;
}

/// User record as stored in the database.
#[derive(Debug, Clone, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id.to_string(),
            username: record.username,
            email: record.email,
            password_hash: record.password_hash,
            created_at: format_timestamp(record.created_at),
            updated_at: format_timestamp(record.updated_at),
        }
    }
}

/// PostgreSQL user repository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Identifiers are UUIDs; anything else cannot match a row.
fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find(&self, id: &str) -> Result<Option<User>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };

        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::from))
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    async fn save(&self, user: &User) -> Result<Option<User>> {
        let Some(id) = parse_id(&user.id) else {
            return Ok(None);
        };

        // `now()` is frozen per transaction: force a strictly later value.
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users
            SET
                username = $2,
                email = $3,
                updated_at = GREATEST(now(), updated_at + interval '1 microsecond')
            WHERE id = $1
            RETURNING id, username, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&user.username)
        .bind(&user.email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::from))
    }

    async fn remove(&self, id: &str) -> Result<u64> {
        let Some(id) = parse_id(id) else {
            return Ok(0);
        };

        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into(),
        }
    }

    #[test]
    fn test_parse_id() {
        assert!(parse_id("0b7e3e0c-5d2b-4c55-9a8e-3f1f2f0f4a11").is_some());
        assert!(parse_id("1").is_none());
        assert!(parse_id("").is_none());
        // ids are compared verbatim.
        assert!(parse_id(" 0b7e3e0c-5d2b-4c55-9a8e-3f1f2f0f4a11 ").is_none());
    }

    #[test]
    fn test_record_mapping() {
        let created_at = DateTime::parse_from_rfc3339("2023-10-27T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = Uuid::new_v4();
        let user = User::from(UserRecord {
            id,
            username: "alice".into(),
            email: "a@x.com".into(),
            password_hash: "hash".into(),
            created_at,
            updated_at: created_at + chrono::Duration::milliseconds(1500),
        });

        assert_eq!(user.id, id.to_string());
        assert_eq!(user.created_at, "2023-10-27T10:00:00.000000Z");
        assert_eq!(user.updated_at, "2023-10-27T10:00:01.500000Z");
    }

    #[sqlx::test]
    #[cfg_attr(
        not(postgres_tests),
        ignore = "requires a PostgreSQL instance through DATABASE_URL"
    )]
    async fn test_pg_lifecycle(pool: PgPool) {
        let repo = PgUserRepository::new(pool);

        let user = repo.insert(new_user("alice", "a@x.com")).await.unwrap();
        assert_eq!(user.created_at, user.updated_at);
        assert_eq!(repo.find(&user.id).await.unwrap().as_ref(), Some(&user));

        let mut changed = user.clone();
        changed.username = "alice2".into();
        let saved = repo.save(&changed).await.unwrap().unwrap();
        assert_eq!(saved.username, "alice2");
        assert!(saved.updated_at > user.updated_at);

        assert_eq!(repo.remove(&user.id).await.unwrap(), 1);
        assert_eq!(repo.remove(&user.id).await.unwrap(), 0);
        assert!(repo.find(&user.id).await.unwrap().is_none());
        assert!(repo.save(&saved).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[cfg_attr(
        not(postgres_tests),
        ignore = "requires a PostgreSQL instance through DATABASE_URL"
    )]
    async fn test_pg_unique_email(pool: PgPool) {
        let repo = PgUserRepository::new(pool);

        repo.insert(new_user("alice", "a@x.com")).await.unwrap();
        let err = repo.insert(new_user("bob", "A@x.com")).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::ConstraintViolation { ref constraint } if constraint == "users_email_key"
        ));
    }

    #[sqlx::test]
    #[cfg_attr(
        not(postgres_tests),
        ignore = "requires a PostgreSQL instance through DATABASE_URL"
    )]
    async fn test_pg_unknown_id(pool: PgPool) {
        let repo = PgUserRepository::new(pool);

        assert!(repo.find("not-a-uuid").await.unwrap().is_none());
        assert!(repo.find(&Uuid::new_v4().to_string()).await.unwrap().is_none());
        assert_eq!(repo.remove("42").await.unwrap(), 0);
    }
}
