//! In-memory [`UserStore`] used by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ContactDetails, NewUser, StoreError, UniqueField, User, UserProfile, UserStore};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    profiles: HashMap<Uuid, UserProfile>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
    stale_username_reads: AtomicUsize,
}

impl MemoryUserStore {
    /// Makes every following call fail like an unreachable database.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The next `count` username lookups report "free", as if another
    /// signup had not committed yet.
    pub fn set_stale_username_reads(&self, count: usize) {
        self.stale_username_reads.store(count, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    /// Direct write access for arranging test fixtures.
    pub async fn put(&self, user: User) {
        let mut tables = self.tables.write().await;
        tables.users.retain(|u| u.id != user.id);
        tables.users.push(user);
    }

    pub async fn has_profile(&self, user_id: Uuid) -> bool {
        self.tables.read().await.profiles.contains_key(&user_id)
    }

    async fn find(&self, pred: impl Fn(&User) -> bool) -> Result<Option<User>, StoreError> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| pred(u)).cloned())
    }

    /// Applies `f` to the stored user under the write lock. `f` returns
    /// whether it changed anything.
    async fn modify(&self, id: Uuid, f: impl FnOnce(&mut User) -> bool) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        Ok(tables.users.iter_mut().find(|u| u.id == id).is_some_and(f))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.find(|u| u.id == id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find(|u| u.email == email).await
    }

    async fn find_by_email_or_username(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        if let Some(user) = self.find(|u| u.email == identifier).await? {
            return Ok(Some(user));
        }
        self.find(|u| u.username == identifier).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        self.find(|u| u.phone.as_deref() == Some(phone)).await
    }

    async fn username_exists(&self, username: &str) -> Result<bool, StoreError> {
        let stale = self
            .stale_username_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            self.check_online()?;
            return Ok(false);
        }
        Ok(self.find(|u| u.username == username).await?.is_some())
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(UniqueField::Email));
        }
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(UniqueField::Username));
        }
        let user = user.into_user(OffsetDateTime::now_utc());
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        self.modify(id, |u| {
            u.last_login = Some(at);
            true
        })
        .await?;
        Ok(())
    }

    async fn reissue_code(&self, id: Uuid, code: &str, expires: OffsetDateTime) -> Result<bool, StoreError> {
        self.modify(id, |u| {
            if u.is_active {
                return false;
            }
            u.verification_code = Some(code.to_owned());
            u.verification_code_expires = Some(expires);
            true
        })
        .await
    }

    async fn activate(&self, id: Uuid, code: &str, welcome_otp: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        let Some(user) = tables
            .users
            .iter_mut()
            .find(|u| u.id == id && !u.is_active && u.verification_code.as_deref() == Some(code))
        else {
            return Ok(false);
        };
        user.is_active = true;
        user.verification_code = None;
        user.verification_code_expires = None;
        user.welcome_otp = Some(welcome_otp.to_owned());
        tables.profiles.entry(id).or_insert_with(|| UserProfile::empty(id));
        Ok(true)
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        self.check_online()?;
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn complete_profile(&self, contact: &ContactDetails, profile: &UserProfile) -> Result<(), StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == profile.user_id) {
            user.first_name = Some(contact.first_name.clone());
            user.last_name = Some(contact.last_name.clone());
            user.phone = contact.phone.clone();
            user.profile_completed = true;
        }
        tables.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }
}
