//! The persistence collaborator: user records and the store seam.
//!
//! The core crate only contracts the credential fields; everything else on
//! the record belongs here. `UserStore` is the seam a database-backed
//! implementation would fill in; `MemoryUserStore` is the in-process
//! implementation the binary runs with.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pavilion_core::{Clock, CredentialSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Superadmin,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercased and trimmed; lookups assume the same normalization.
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_verified: bool,
    pub credentials: CredentialSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: User) -> Result<(), StoreError>;
    async fn find_by_email(&self, email: &str) -> Option<User>;
    async fn find_by_id(&self, id: Uuid) -> Option<User>;
    /// Replaces the stored record wholesale; one record per call, so a
    /// credential consumption and the state change it authorized always land
    /// together.
    async fn update(&self, user: User) -> Result<(), StoreError>;
}

pub struct MemoryUserStore {
    users: DashMap<Uuid, User>,
    clock: Arc<dyn Clock>,
}

impl MemoryUserStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: DashMap::new(),
            clock,
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: User) -> Result<(), StoreError> {
        if self.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        self.users.insert(user.id, user);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.value().clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    async fn update(&self, mut user: User) -> Result<(), StoreError> {
        if !self.users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        user.updated_at = self.clock.now();
        self.users.insert(user.id, user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pavilion_core::ManualClock;
    use std::time::Duration;

    fn store() -> (Arc<ManualClock>, MemoryUserStore) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let store = MemoryUserStore::new(clock.clone());
        (clock, store)
    }

    fn visitor(clock: &dyn Clock, email: &str) -> User {
        let now = clock.now();
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: "Mara".to_string(),
            last_name: "Voss".to_string(),
            role: Role::User,
            is_verified: false,
            credentials: CredentialSet::from_hash("hash".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_find() {
        let (clock, store) = store();
        let user = visitor(clock.as_ref(), "mara@example.com");
        let id = user.id;

        store.insert(user).await.unwrap();

        assert!(store.find_by_email("mara@example.com").await.is_some());
        assert!(store.find_by_id(id).await.is_some());
        assert!(store.find_by_email("nobody@example.com").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (clock, store) = store();
        store
            .insert(visitor(clock.as_ref(), "mara@example.com"))
            .await
            .unwrap();

        let result = store.insert(visitor(clock.as_ref(), "mara@example.com")).await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn update_touches_updated_at() {
        let (clock, store) = store();
        let mut user = visitor(clock.as_ref(), "mara@example.com");
        store.insert(user.clone()).await.unwrap();

        clock.advance(Duration::from_secs(60));
        user.is_verified = true;
        store.update(user.clone()).await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap();
        assert!(stored.is_verified);
        assert_eq!(stored.updated_at, clock.now());
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let (clock, store) = store();
        let user = visitor(clock.as_ref(), "ghost@example.com");

        let result = store.update(user).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }
}
