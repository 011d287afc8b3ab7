//! Shared fixtures for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::services::{EmailMessage, LifecycleManager, Mailer, ManualClock};
use crate::storage::{LocalStorage, StorageProvider};

/// Local storage whose writes and deletes can be made to fail
pub struct FlakyStorage {
    inner: LocalStorage,
    fail_puts: AtomicBool,
    stall_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyStorage {
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Writes still land but then never return
    pub fn stall_puts(&self, stall: bool) {
        self.stall_puts.store(stall, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageProvider for FlakyStorage {
    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::Storage("backend unavailable".to_string()));
        }
        let handle = self.inner.put(key, data).await?;
        if self.stall_puts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(handle)
    }

    fn handle_for_key(&self, key: &str) -> Option<String> {
        self.inner.handle_for_key(key)
    }

    async fn get(&self, handle: &str) -> Result<Bytes> {
        self.inner.get(handle).await
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Storage("backend unavailable".to_string()));
        }
        self.inner.delete(handle).await
    }

    async fn exists(&self, handle: &str) -> Result<bool> {
        self.inner.exists(handle).await
    }

    fn download_url(&self, handle: &str) -> Option<String> {
        self.inner.download_url(handle)
    }

    fn storage_type(&self) -> &'static str {
        "flaky-local"
    }
}

/// Mailer that keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Mail("smtp relay down".to_string()));
        }
        Ok(())
    }
}

/// Scratch database, blob directory and manual clock wired into a manager
pub struct TestEnv {
    pub dir: TempDir,
    pub db: Database,
    pub storage: Arc<FlakyStorage>,
    pub clock: Arc<ManualClock>,
    pub manager: Arc<LifecycleManager>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        db.run_migrations().await.unwrap();

        let storage = Arc::new(FlakyStorage {
            inner: LocalStorage::new(dir.path().join("blobs")),
            fail_puts: AtomicBool::new(false),
            stall_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        });
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let manager = Arc::new(LifecycleManager::new(
            db.clone(),
            storage.clone(),
            clock.clone(),
            Duration::hours(24),
        ));

        Self {
            dir,
            db,
            storage,
            clock,
            manager,
        }
    }

    /// Number of blobs currently on disk
    pub fn stored_blobs(&self) -> usize {
        let Ok(shards) = std::fs::read_dir(self.dir.path().join("blobs")) else {
            return 0;
        };
        shards
            .filter_map(|shard| std::fs::read_dir(shard.ok()?.path()).ok())
            .map(|blobs| blobs.count())
            .sum()
    }

    /// Number of rows in `table`
    pub async fn row_count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }
}
