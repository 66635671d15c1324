use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::profile::{Profile, ProfilePatch};
use super::role::Role;
use crate::error::StoreError;

/// How a provider searches the patient directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "term", rename_all = "snake_case")]
pub enum PatientQuery {
    /// Case-insensitive substring of the full name.
    Name(String),
    /// Exact profile id.
    Id(String),
}

/// Row-style profile table keyed by identity id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError>;
    async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError>;
    /// Merge `patch` and return the stored result.
    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError>;
    async fn search_patients(&self, query: &PatientQuery) -> Result<Vec<Profile>, StoreError>;
}

/// In-memory profile table with the same failure surface as a remote one.
#[derive(Default)]
pub struct MemoryProfileStore {
    rows: RwLock<HashMap<String, Profile>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryProfileStore {
    pub fn new() -> Self { Self::default() }

    /// Insert or replace a row without going through the network path.
    pub fn put(&self, profile: Profile) {
        self.rows.write().insert(profile.id().to_string(), profile);
    }

    pub fn len(&self) -> usize { self.rows.read().len() }

    pub fn is_empty(&self) -> bool { self.rows.read().is_empty() }

    pub fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::SeqCst); }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Network("profile store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, id: &str) -> Result<Profile, StoreError> {
        self.round_trip().await?;
        self.rows.read().get(id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        self.round_trip().await?;
        let mut rows = self.rows.write();
        if rows.contains_key(profile.id()) {
            return Err(StoreError::WriteConflict(profile.id().to_string()));
        }
        rows.insert(profile.id().to_string(), profile);
        Ok(())
    }

    async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        self.round_trip().await?;
        let mut rows = self.rows.write();
        let current = rows.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let next = current.apply(patch)?;
        rows.insert(id.to_string(), next.clone());
        Ok(next)
    }

    async fn search_patients(&self, query: &PatientQuery) -> Result<Vec<Profile>, StoreError> {
        self.round_trip().await?;
        let rows = self.rows.read();
        let mut out: Vec<Profile> = rows
            .values()
            .filter(|p| p.role() == Role::Patient)
            .filter(|p| match query {
                PatientQuery::Id(id) => p.id() == id,
                PatientQuery::Name(term) => {
                    let needle = term.trim().to_lowercase();
                    p.base().full_name.as_deref().map(|n| n.to_lowercase().contains(&needle)).unwrap_or(false)
                }
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(id: &str, name: &str) -> Profile {
        Profile::new(id, Role::Patient, Some(name.to_string()), None)
    }

    #[tokio::test]
    async fn insert_get_update() {
        let store = MemoryProfileStore::new();
        store.insert_profile(patient("p1", "Jane Smith")).await.unwrap();
        assert!(matches!(store.insert_profile(patient("p1", "Other")).await, Err(StoreError::WriteConflict(_))));

        let patch = ProfilePatch { phone: Some("(555) 123-4567".into()), ..Default::default() };
        let updated = store.update_profile("p1", &patch).await.unwrap();
        assert_eq!(updated.base().phone.as_deref(), Some("(555) 123-4567"));
        assert_eq!(store.get_profile("p1").await.unwrap(), updated);
        assert!(matches!(store.get_profile("nope").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejected_patch_leaves_row_untouched() {
        let store = MemoryProfileStore::new();
        store.put(Profile::new("d1", Role::Provider, Some("Dr. Michael Johnson".into()), None));
        let patch = ProfilePatch {
            clinical: Some(Default::default()),
            ..Default::default()
        };
        assert!(store.update_profile("d1", &patch).await.is_err());
        assert_eq!(store.get_profile("d1").await.unwrap().base().full_name.as_deref(), Some("Dr. Michael Johnson"));
    }

    #[tokio::test]
    async fn search_only_returns_patients() {
        let store = MemoryProfileStore::new();
        store.put(patient("p1", "Jane Smith"));
        store.put(patient("p2", "Robert Martinez"));
        store.put(Profile::new("d1", Role::Provider, Some("Dr. Jane Provider".into()), None));

        let hits = store.search_patients(&PatientQuery::Name("jane".into())).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), "p1");

        let hits = store.search_patients(&PatientQuery::Id("p2".into())).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.search_patients(&PatientQuery::Id("d1".into())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_store_fails_with_network_error() {
        let store = MemoryProfileStore::new();
        store.put(patient("p1", "Jane Smith"));
        store.set_offline(true);
        assert!(matches!(store.get_profile("p1").await, Err(StoreError::Network(_))));
    }
}
