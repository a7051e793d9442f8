use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::{ContactDetails, NewUser, User, UserProfile};

const USER_COLUMNS: &str = r#"
    id, email, username, hashed_password, first_name, last_name, phone, role,
    is_active, is_verified, profile_completed, verification_code,
    verification_code_expires, welcome_otp, last_login, created_at
"#;

const EMAIL_CONSTRAINT: &str = "users_email_key";
const USERNAME_CONSTRAINT: &str = "users_username_key";

/// Column guarded by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint on {0:?} violated")]
    Conflict(UniqueField),
    #[error("database request failed: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Maps unique violations on the users table to [`StoreError::Conflict`].
    fn from_insert(err: sqlx::Error) -> Self {
        let field = err
            .as_database_error()
            .filter(|db| db.is_unique_violation())
            .and_then(|db| match db.constraint() {
                Some(EMAIL_CONSTRAINT) => Some(UniqueField::Email),
                Some(USERNAME_CONSTRAINT) => Some(UniqueField::Username),
                _ => None,
            });
        match field {
            Some(field) => Self::Conflict(field),
            None => Self::Database(err),
        }
    }
}

/// Persisted users and profiles.
///
/// Uniqueness of `email` and `username` is enforced by the store itself;
/// callers treat [`StoreError::Conflict`] as the authoritative answer.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Cheap round trip used by the health check.
    async fn ping(&self) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email_or_username(&self, identifier: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError>;
    async fn username_exists(&self, username: &str) -> Result<bool, StoreError>;
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    /// Sets `last_login` and no other column.
    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError>;
    /// Replaces the pending code of a user that is still inactive. Returns
    /// `false` when the user is already active.
    async fn reissue_code(&self, id: Uuid, code: &str, expires: OffsetDateTime) -> Result<bool, StoreError>;
    /// Activates the user only while `code` is still its pending code:
    /// clears the code, stores `welcome_otp` and creates the empty profile,
    /// atomically. Returns whether the code matched.
    async fn activate(&self, id: Uuid, code: &str, welcome_otp: &str) -> Result<bool, StoreError>;
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError>;
    /// Writes the contact columns, marks the profile complete and upserts
    /// `profile`, atomically.
    async fn complete_profile(&self, contact: &ContactDetails, profile: &UserProfile) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, value: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter} LIMIT 1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email = $1", email).await
    }

    async fn find_by_email_or_username(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        self.find_one("email = $1 OR username = $1 ORDER BY (email = $1) DESC", identifier)
            .await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        self.find_one("phone = $1 ORDER BY created_at", phone).await
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let query = format!(
            r#"
            INSERT INTO users (id, email, username, hashed_password, first_name, role,
                               verification_code, verification_code_expires)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.hashed_password)
            .bind(&user.first_name)
            .bind(user.role.as_str())
            .bind(&user.verification_code)
            .bind(user.verification_code_expires)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_insert)
    }

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reissue_code(&self, id: Uuid, code: &str, expires: OffsetDateTime) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET verification_code = $2, verification_code_expires = $3
            WHERE id = $1 AND is_active = FALSE
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn activate(&self, id: Uuid, code: &str, welcome_otp: &str) -> Result<bool, StoreError> {
        // Dropping `tx` without commit rolls back.
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_active = TRUE, verification_code = NULL,
                verification_code_expires = NULL, welcome_otp = $3
            WHERE id = $1 AND is_active = FALSE AND verification_code = $2
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(welcome_otp)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query("INSERT INTO user_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, bio, skills, years_experience, education, street, city, state,
                   country, zip, full_address, website, linkedin, github, languages, availability
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn complete_profile(&self, contact: &ContactDetails, profile: &UserProfile) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, phone = $4, profile_completed = TRUE
            WHERE id = $1
            "#,
        )
        .bind(profile.user_id)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.phone)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, bio, skills, years_experience, education, street,
                                       city, state, country, zip, full_address, website,
                                       linkedin, github, languages, availability)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (user_id) DO UPDATE SET
                bio = EXCLUDED.bio, skills = EXCLUDED.skills,
                years_experience = EXCLUDED.years_experience, education = EXCLUDED.education,
                street = EXCLUDED.street, city = EXCLUDED.city, state = EXCLUDED.state,
                country = EXCLUDED.country, zip = EXCLUDED.zip,
                full_address = EXCLUDED.full_address, website = EXCLUDED.website,
                linkedin = EXCLUDED.linkedin, github = EXCLUDED.github,
                languages = EXCLUDED.languages, availability = EXCLUDED.availability
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.bio)
        .bind(profile.skills.as_slice())
        .bind(profile.years_experience)
        .bind(&profile.education)
        .bind(&profile.street)
        .bind(&profile.city)
        .bind(&profile.state)
        .bind(&profile.country)
        .bind(&profile.zip)
        .bind(&profile.full_address)
        .bind(&profile.website)
        .bind(&profile.linkedin)
        .bind(&profile.github)
        .bind(profile.languages.as_slice())
        .bind(&profile.availability)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
