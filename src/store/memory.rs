//! In-memory object store for tests and single-node development.
//!
//! Fully synchronous internally; the async trait methods return immediately.
//! Failure injection toggles let the failure paths of upload and delete be
//! exercised without a real backend.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

use crate::store::{ObjectStore, SignedUrl, StoreError, StoreResult};

#[derive(Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    fail_health: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put_object` fail with `Unavailable`.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete_object` fail with `Unavailable`.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make `health_check` report the backend as down.
    pub fn fail_health(&self, fail: bool) {
        self.fail_health.store(fail, Ordering::SeqCst);
    }

    /// Bytes stored under `key`, if any.
    pub fn object_bytes(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|obj| obj.bytes.clone())
    }

    /// Content type recorded for `key`, if any.
    pub fn object_content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|obj| obj.content_type.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected put failure".into()));
        }
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected delete failure".into()));
        }
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn sign_url(&self, key: &str, ttl: Duration) -> StoreResult<SignedUrl> {
        if !self.objects.lock().unwrap().contains_key(key) {
            return Err(StoreError::NotFound);
        }
        // Unique per issue so refreshes are observable in tests.
        Ok(SignedUrl {
            url: format!("memory://{}?sig={}", key, Uuid::new_v4()),
            expires_at: Utc::now() + ttl,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        if self.fail_health.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected health failure".into()));
        }
        Ok(())
    }
}
