//! Ephemeral blob storage with in-memory metadata

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreError};
use crate::names::{is_plain_component, NameResolver};
use crate::ttl::resolve_expiration;
use crate::types::{FileRecord, StagedUpload, StoreStats, StoredFile, SweepReport};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct Index {
    records: HashMap<String, FileRecord>,
    /// Names handed out by the resolver whose rename has not finished yet
    reserved: HashSet<String>,
}

impl Index {
    fn is_taken(&self, name: &str) -> bool {
        self.records.contains_key(name) || self.reserved.contains(name)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Eviction {
    Removed,
    UnlinkFailed,
    /// Someone else evicted or replaced the record first
    AlreadyGone,
}

/// An open blob ready to be streamed, plus the headers' source metadata
#[derive(Debug)]
pub struct BlobHandle {
    pub record: FileRecord,
    pub file: File,
}

/// Owns the blob directory and the metadata index. Cheap to clone; clones
/// share the same index.
#[derive(Clone)]
pub struct EphemeralStore {
    index: Arc<RwLock<Index>>,
    blob_dir: PathBuf,
    public_base_url: String,
    resolver: NameResolver,
    clock: Arc<dyn Clock>,
}

impl EphemeralStore {
    pub fn new(blob_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let public_base_url: String = public_base_url.into();
        Self {
            index: Arc::new(RwLock::new(Index::default())),
            blob_dir: blob_dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            resolver: NameResolver::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_resolver(mut self, resolver: NameResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn blob_dir(&self) -> &Path {
        &self.blob_dir
    }

    /// Ensure the blob directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.blob_dir)
            .await
            .map_err(|e| StoreError::io("create_dir", &self.blob_dir, e))?;
        info!(blob_dir = ?self.blob_dir, "Ephemeral store initialized");
        Ok(())
    }

    pub fn download_url(&self, public_name: &str) -> String {
        format!(
            "{}/files/{}",
            self.public_base_url,
            encode_path_segment(public_name)
        )
    }

    /// Run `op` on its own task. A caller dropped mid-way (a client
    /// disconnect) cannot stop it between an index update and the matching
    /// filesystem change.
    async fn detached<T, F, Fut>(&self, op: F) -> std::result::Result<T, JoinError>
    where
        F: FnOnce(EphemeralStore) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(op(self.clone())).await
    }

    /// Move a staged upload into the blob directory and index it.
    ///
    /// The record is inserted only after the rename succeeded. On failure the
    /// staged file is left where it was. Once started, a put runs to
    /// completion even if the returned future is dropped.
    pub async fn put(&self, upload: StagedUpload) -> Result<StoredFile> {
        let staged_path = upload.staged_path.clone();
        self.detached(|store| async move { store.put_now(upload).await })
            .await
            .map_err(|e| StoreError::io("put", &staged_path, io::Error::other(e)))?
    }

    async fn put_now(&self, upload: StagedUpload) -> Result<StoredFile> {
        let uploaded_at = self.clock.now();
        let expires_at = resolve_expiration(&upload.ttl, uploaded_at);

        let public_name = self
            .reserve_name(upload.desired_name.as_deref(), &upload.original_name)
            .await?;
        let target = self.blob_dir.join(&public_name);

        if let Err(e) = fs::rename(&upload.staged_path, &target).await {
            self.index.write().await.reserved.remove(&public_name);
            error!(
                from = ?upload.staged_path,
                to = ?target,
                error = %e,
                "Failed to move staged upload into blob directory"
            );
            return Err(StoreError::io("rename", &upload.staged_path, e));
        }

        let record = FileRecord {
            public_name: public_name.clone(),
            original_name: upload.original_name,
            size_bytes: upload.size_bytes,
            mime_type: upload.mime_type,
            uploaded_at,
            expires_at,
        };

        {
            let mut index = self.index.write().await;
            index.reserved.remove(&public_name);
            index.records.insert(public_name.clone(), record.clone());
        }

        info!(
            name = %public_name,
            size = record.size_bytes,
            expires_at = %record.expires_at,
            "Stored upload"
        );

        Ok(StoredFile {
            download_url: self.download_url(&public_name),
            record,
        })
    }

    /// Resolve a collision-free name and reserve it. A candidate is free only
    /// if neither the index nor the blob directory knows it. The disk is
    /// checked outside the index lock, so the index is re-checked before
    /// reserving.
    async fn reserve_name(&self, desired: Option<&str>, original: &str) -> Result<String> {
        let base = self.resolver.base_name(desired, original);

        for candidate in self.resolver.candidates(&base) {
            if self.index.read().await.is_taken(&candidate) {
                continue;
            }

            let path = self.blob_dir.join(&candidate);
            match fs::try_exists(&path).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => return Err(StoreError::io("exists", &path, e)),
            }

            let mut index = self.index.write().await;
            if index.is_taken(&candidate) {
                continue;
            }
            index.reserved.insert(candidate.clone());
            debug!(base = %base, name = %candidate, "Reserved public name");
            return Ok(candidate);
        }

        error!(base = %base, "Name resolution exhausted");
        Err(StoreError::NameResolutionExhausted {
            base,
            attempts: self.resolver.max_attempts(),
        })
    }

    /// Open a stored blob for streaming
    pub async fn get(&self, public_name: &str) -> Result<BlobHandle> {
        let record = self.live_record(public_name).await?;
        let path = self.blob_dir.join(public_name);

        match File::open(&path).await {
            Ok(file) => {
                debug!(name = %public_name, "Opened blob");
                Ok(BlobHandle { record, file })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.heal_dangling(&record).await;
                Err(StoreError::NotFound(public_name.to_string()))
            }
            Err(e) => {
                error!(name = %public_name, path = ?path, error = %e, "Failed to open blob");
                Err(StoreError::io("open", &path, e))
            }
        }
    }

    /// Same checks as `get`, without opening the blob
    pub async fn stat(&self, public_name: &str) -> Result<FileRecord> {
        let record = self.live_record(public_name).await?;
        let path = self.blob_dir.join(public_name);

        match fs::try_exists(&path).await {
            Ok(true) => Ok(record),
            Ok(false) => {
                self.heal_dangling(&record).await;
                Err(StoreError::NotFound(public_name.to_string()))
            }
            Err(e) => {
                error!(name = %public_name, path = ?path, error = %e, "Failed to stat blob");
                Err(StoreError::io("exists", &path, e))
            }
        }
    }

    /// Index lookup plus lazy expiry
    async fn live_record(&self, public_name: &str) -> Result<FileRecord> {
        if !is_plain_component(public_name) {
            return Err(StoreError::NotFound(public_name.to_string()));
        }

        let record = {
            let index = self.index.read().await;
            index.records.get(public_name).cloned()
        }
        .ok_or_else(|| StoreError::NotFound(public_name.to_string()))?;

        if record.is_expired_at(self.clock.now()) {
            debug!(name = %public_name, expires_at = %record.expires_at, "Record expired on access");
            self.evict(&record).await;
            return Err(StoreError::Expired(public_name.to_string()));
        }

        Ok(record)
    }

    async fn heal_dangling(&self, record: &FileRecord) {
        warn!(name = %record.public_name, "Blob missing for indexed record, removing record");
        self.evict(record).await;
    }

    /// Remove `record` if the index still holds exactly it, then unlink its blob
    async fn evict(&self, record: &FileRecord) -> Eviction {
        let owned = record.clone();
        match self
            .detached(|store| async move { store.evict_now(&owned).await })
            .await
        {
            Ok(eviction) => eviction,
            Err(e) => {
                error!(name = %record.public_name, error = %e, "Eviction task failed");
                Eviction::UnlinkFailed
            }
        }
    }

    async fn evict_now(&self, record: &FileRecord) -> Eviction {
        let removed = {
            let mut index = self.index.write().await;
            match index.records.get(&record.public_name) {
                Some(current) if current == record => {
                    index.records.remove(&record.public_name);
                    true
                }
                _ => false,
            }
        };

        if !removed {
            return Eviction::AlreadyGone;
        }

        match self.unlink(&record.public_name).await {
            Ok(()) => Eviction::Removed,
            Err(e) => {
                warn!(name = %record.public_name, error = %e, "Failed to delete blob");
                Eviction::UnlinkFailed
            }
        }
    }

    /// Delete a blob file. A file that is already gone counts as success.
    async fn unlink(&self, public_name: &str) -> io::Result<()> {
        match fs::remove_file(self.blob_dir.join(public_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete a record and its blob. Returns whether a record existed;
    /// repeated calls are no-ops.
    pub async fn remove(&self, public_name: &str) -> Result<bool> {
        let name = public_name.to_string();
        self.detached(|store| async move { store.remove_now(&name).await })
            .await
            .map_err(|e| {
                StoreError::io("unlink", &self.blob_dir.join(public_name), io::Error::other(e))
            })?
    }

    async fn remove_now(&self, public_name: &str) -> Result<bool> {
        let record = {
            let mut index = self.index.write().await;
            index.records.remove(public_name)
        };

        if record.is_none() {
            return Ok(false);
        }

        self.unlink(public_name)
            .await
            .map_err(|e| StoreError::io("unlink", &self.blob_dir.join(public_name), e))?;
        debug!(name = %public_name, "Removed file");
        Ok(true)
    }

    /// Evict every record expired at the time of the call. Works from a
    /// snapshot so the index is not locked while blobs are deleted.
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = self.clock.now();
        let expired: Vec<FileRecord> = {
            let index = self.index.read().await;
            index
                .records
                .values()
                .filter(|r| r.is_expired_at(now))
                .cloned()
                .collect()
        };

        let mut report = SweepReport::default();
        for record in &expired {
            match self.evict(record).await {
                Eviction::Removed => {
                    report.removed += 1;
                    debug!(name = %record.public_name, "Deleted expired file");
                }
                Eviction::UnlinkFailed => {
                    report.removed += 1;
                    report.failed += 1;
                }
                Eviction::AlreadyGone => {}
            }
        }

        if report.removed > 0 {
            info!(
                removed = report.removed,
                failed = report.failed,
                "Cleaned up expired files"
            );
        }

        report
    }

    /// Delete regular files in the blob directory that have no record and
    /// no pending reservation. Subdirectories are left alone.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut entries = fs::read_dir(&self.blob_dir)
            .await
            .map_err(|e| StoreError::io("read_dir", &self.blob_dir, e))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io("read_dir", &self.blob_dir, e))?
        {
            let is_file = match entry.file_type().await {
                Ok(ft) => ft.is_file(),
                Err(e) => {
                    warn!(path = ?entry.path(), error = %e, "Failed to read entry type");
                    continue;
                }
            };
            if !is_file {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            if self.index.read().await.is_taken(&name) {
                continue;
            }

            match self.unlink(&name).await {
                Ok(()) => {
                    removed += 1;
                    debug!(name = %name, "Removed orphaned blob");
                }
                Err(e) => warn!(name = %name, error = %e, "Failed to remove orphaned blob"),
            }
        }

        if removed > 0 {
            info!(removed, "Reconciled blob directory");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> StoreStats {
        let index = self.index.read().await;
        StoreStats {
            active_files: index.records.len(),
            total_bytes: index.records.values().map(|r| r.size_bytes).sum(),
        }
    }
}

/// Percent-encode what a URL path segment cannot carry literally. RFC 3986
/// `pchar` bytes (unreserved, sub-delims, `:` and `@`) pass through, so
/// `a(1).txt` stays readable.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => out.push(b as char),
            b'-' | b'.' | b'_' | b'~' => out.push(b as char),
            b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=' => {
                out.push(b as char)
            }
            b':' | b'@' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, Utc};
    use std::collections::HashSet;
    use tempfile::{tempdir, TempDir};
    use tokio::io::AsyncReadExt;

    struct Fixture {
        _dir: TempDir,
        store: EphemeralStore,
        clock: Arc<ManualClock>,
        staging: PathBuf,
        staged: std::sync::atomic::AtomicUsize,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_resolver(NameResolver::default()).await
        }

        async fn with_resolver(resolver: NameResolver) -> Self {
            let dir = tempdir().unwrap();
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let store = EphemeralStore::new(dir.path().join("uploads"), "https://mabox.test/")
                .with_clock(clock.clone())
                .with_resolver(resolver);
            store.init().await.unwrap();

            let staging = store.blob_dir().join(".staging");
            fs::create_dir_all(&staging).await.unwrap();

            Self {
                _dir: dir,
                store,
                clock,
                staging,
                staged: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        async fn stage(&self, original: &str, data: &[u8], ttl: &str) -> StagedUpload {
            let n = self
                .staged
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let staged_path = self.staging.join(format!("temp_{}", n));
            fs::write(&staged_path, data).await.unwrap();
            StagedUpload {
                staged_path,
                original_name: original.to_string(),
                size_bytes: data.len() as u64,
                mime_type: "text/plain".to_string(),
                ttl: ttl.to_string(),
                desired_name: None,
            }
        }

        async fn put(&self, original: &str, data: &[u8], ttl: &str) -> StoredFile {
            let upload = self.stage(original, data, ttl).await;
            self.store.put(upload).await.unwrap()
        }

        fn on_disk(&self, name: &str) -> bool {
            self.store.blob_dir().join(name).exists()
        }
    }

    async fn read_all(mut handle: BlobHandle) -> Vec<u8> {
        let mut buf = Vec::new();
        handle.file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_put_then_get_returns_identical_bytes() {
        let fx = Fixture::new().await;
        let data = b"%PDF-1.7 quarterly numbers";

        let stored = fx.put("report.pdf", data, "10s").await;
        assert_eq!(stored.record.public_name, "report.pdf");
        assert_eq!(stored.download_url, "https://mabox.test/files/report.pdf");
        assert!(stored.record.expires_at > stored.record.uploaded_at);

        let handle = fx.store.get("report.pdf").await.unwrap();
        assert_eq!(handle.record, stored.record);
        assert_eq!(read_all(handle).await, data);
    }

    #[tokio::test]
    async fn test_expired_then_not_found() {
        let fx = Fixture::new().await;
        fx.put("report.pdf", b"bytes", "10s").await;

        assert!(fx.store.get("report.pdf").await.is_ok());

        fx.clock.advance(Duration::seconds(11));

        let err = fx.store.get("report.pdf").await.unwrap_err();
        assert!(matches!(err, StoreError::Expired(_)));
        assert!(!fx.on_disk("report.pdf"));

        let err = fx.store.get("report.pdf").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expiry_at_exact_deadline() {
        let fx = Fixture::new().await;
        let stored = fx.put("a.txt", b"x", "30s").await;

        fx.clock.set(stored.record.expires_at);
        let err = fx.store.stat("a.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::Expired(_)));
    }

    #[tokio::test]
    async fn test_repeated_names_are_disambiguated() {
        let fx = Fixture::new().await;

        let first = fx.put("a.txt", b"one", "1h").await;
        let second = fx.put("a.txt", b"two", "1h").await;
        assert_eq!(first.record.public_name, "a.txt");
        assert_eq!(second.record.public_name, "a(1).txt");
        assert_eq!(second.download_url, "https://mabox.test/files/a(1).txt");

        let mut names = vec![first.record.public_name, second.record.public_name];
        for _ in 0..3 {
            names.push(fx.put("a.txt", b"more", "1h").await.record.public_name);
        }
        assert_eq!(names, vec!["a.txt", "a(1).txt", "a(2).txt", "a(3).txt", "a(4).txt"]);

        let handle = fx.store.get("a(1).txt").await.unwrap();
        assert_eq!(read_all(handle).await, b"two");
    }

    #[test]
    fn test_download_url_escapes_only_what_a_path_needs() {
        assert_eq!(encode_path_segment("a(1).txt"), "a(1).txt");
        assert_eq!(encode_path_segment("hi!.txt"), "hi!.txt");
        assert_eq!(encode_path_segment("my file.pdf"), "my%20file.pdf");
        assert_eq!(encode_path_segment("50%#1?.txt"), "50%25%231%3F.txt");
        assert_eq!(encode_path_segment("café.txt"), "caf%C3%A9.txt");
    }

    #[tokio::test]
    async fn test_desired_name_borrows_original_extension() {
        let fx = Fixture::new().await;
        let mut upload = fx.stage("report.pdf", b"pdf", "1h").await;
        upload.desired_name = Some("q3-summary".to_string());

        let stored = fx.store.put(upload).await.unwrap();
        assert_eq!(stored.record.public_name, "q3-summary.pdf");
        assert_eq!(stored.record.original_name, "report.pdf");
    }

    #[tokio::test]
    async fn test_stray_file_on_disk_counts_as_collision() {
        let fx = Fixture::new().await;
        fs::write(fx.store.blob_dir().join("a.txt"), b"stray")
            .await
            .unwrap();

        let stored = fx.put("a.txt", b"new", "1h").await;
        assert_eq!(stored.record.public_name, "a(1).txt");
        assert!(matches!(
            fx.store.get("a.txt").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_puts_get_distinct_names() {
        let fx = Fixture::new().await;
        let mut uploads = Vec::new();
        for _ in 0..10 {
            uploads.push(fx.stage("same.txt", b"data", "1h").await);
        }

        let tasks: Vec<_> = uploads
            .into_iter()
            .map(|upload| {
                let store = fx.store.clone();
                tokio::spawn(async move { store.put(upload).await })
            })
            .collect();

        let mut names = HashSet::new();
        for task in tasks {
            let stored = task.await.unwrap().unwrap();
            assert!(names.insert(stored.record.public_name));
        }
        assert_eq!(names.len(), 10);
        assert_eq!(fx.store.stats().await.active_files, 10);
    }

    #[tokio::test]
    async fn test_missing_blob_self_heals() {
        let fx = Fixture::new().await;
        fx.put("a.txt", b"data", "1h").await;
        fs::remove_file(fx.store.blob_dir().join("a.txt"))
            .await
            .unwrap();

        let err = fx.store.get("a.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(fx.store.stats().await.active_files, 0);
    }

    #[tokio::test]
    async fn test_stat_self_heals_missing_blob() {
        let fx = Fixture::new().await;
        let stored = fx.put("a.txt", b"data", "1h").await;
        assert_eq!(fx.store.stat("a.txt").await.unwrap(), stored.record);

        fs::remove_file(fx.store.blob_dir().join("a.txt"))
            .await
            .unwrap();
        assert!(matches!(
            fx.store.stat("a.txt").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert_eq!(fx.store.stats().await.active_files, 0);
    }

    #[tokio::test]
    async fn test_path_like_names_are_not_found() {
        let fx = Fixture::new().await;
        fx.put("a.txt", b"data", "1h").await;

        for name in ["../a.txt", "..", "", ".staging/temp_0"] {
            assert!(matches!(
                fx.store.get(name).await.unwrap_err(),
                StoreError::NotFound(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_rename_failure_inserts_nothing() {
        let fx = Fixture::new().await;
        let mut upload = fx.stage("a.txt", b"data", "1h").await;
        upload.staged_path = fx.staging.join("does-not-exist");

        let err = fx.store.put(upload).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageIo { op: "rename", .. }));
        assert_eq!(fx.store.stats().await.active_files, 0);

        // The reservation was released
        let stored = fx.put("a.txt", b"data", "1h").await;
        assert_eq!(stored.record.public_name, "a.txt");
    }

    #[tokio::test]
    async fn test_dropped_put_still_completes() {
        let fx = Fixture::new().await;
        let upload = fx.stage("a.txt", b"data", "1h").await;

        let store = fx.store.clone();
        let task = tokio::spawn(async move { store.put(upload).await });
        for _ in 0..1000 {
            if !fx.store.index.read().await.reserved.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        let mut settled = false;
        for _ in 0..200 {
            let index = fx.store.index.read().await;
            if index.reserved.is_empty() && index.records.contains_key("a.txt") {
                settled = true;
                break;
            }
            drop(index);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(settled);
        assert!(fx.on_disk("a.txt"));
        assert_eq!(fx.store.reconcile().await.unwrap(), 0);

        let handle = fx.store.get("a.txt").await.unwrap();
        assert_eq!(read_all(handle).await, b"data");
        let next = fx.put("a.txt", b"more", "1h").await;
        assert_eq!(next.record.public_name, "a(1).txt");
    }

    #[tokio::test]
    async fn test_name_resolution_exhaustion() {
        let fx = Fixture::with_resolver(NameResolver::new(2)).await;
        fx.put("a.txt", b"1", "1h").await;
        fx.put("a.txt", b"2", "1h").await;

        let upload = fx.stage("a.txt", b"3", "1h").await;
        let staged_path = upload.staged_path.clone();
        let err = fx.store.put(upload).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::NameResolutionExhausted { attempts: 2, .. }
        ));
        assert!(staged_path.exists());
        assert_eq!(fx.store.stats().await.active_files, 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let fx = Fixture::new().await;
        for i in 0..3 {
            fx.put(&format!("short{}.txt", i), b"gone soon", "10s").await;
        }
        for i in 0..2 {
            fx.put(&format!("long{}.txt", i), b"stays", "7d").await;
        }

        fx.clock.advance(Duration::minutes(1));
        let report = fx.store.sweep_expired().await;
        assert_eq!(report, SweepReport { removed: 3, failed: 0 });

        for i in 0..3 {
            let name = format!("short{}.txt", i);
            assert!(!fx.on_disk(&name));
            assert!(matches!(
                fx.store.stat(&name).await.unwrap_err(),
                StoreError::NotFound(_)
            ));
        }
        for i in 0..2 {
            let name = format!("long{}.txt", i);
            assert!(fx.on_disk(&name));
            assert!(fx.store.stat(&name).await.is_ok());
        }

        let stats = fx.store.stats().await;
        assert_eq!(stats.active_files, 2);
        assert_eq!(stats.total_bytes, 10);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let fx = Fixture::new().await;
        fx.put("a.txt", b"x", "10s").await;
        fx.clock.advance(Duration::seconds(30));

        assert_eq!(fx.store.sweep_expired().await.removed, 1);
        assert_eq!(fx.store.sweep_expired().await, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_already_deleted_blob() {
        let fx = Fixture::new().await;
        fx.put("a.txt", b"x", "10s").await;
        fs::remove_file(fx.store.blob_dir().join("a.txt"))
            .await
            .unwrap();
        fx.clock.advance(Duration::seconds(30));

        let report = fx.store.sweep_expired().await;
        assert_eq!(report, SweepReport { removed: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_sweep_counts_failed_unlink_and_continues() {
        let fx = Fixture::new().await;
        for name in ["a.txt", "b.txt", "c.txt"] {
            fx.put(name, b"x", "10s").await;
        }

        // A non-empty directory where b.txt's blob should be
        let blob = fx.store.blob_dir().join("b.txt");
        fs::remove_file(&blob).await.unwrap();
        fs::create_dir(&blob).await.unwrap();
        fs::write(blob.join("inner"), b"y").await.unwrap();

        fx.clock.advance(Duration::seconds(30));
        let report = fx.store.sweep_expired().await;
        assert_eq!(report, SweepReport { removed: 3, failed: 1 });

        assert!(!fx.on_disk("a.txt"));
        assert!(!fx.on_disk("c.txt"));
        assert!(blob.is_dir());
        assert_eq!(fx.store.stats().await.active_files, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_blob_is_storage_error() {
        let fx = Fixture::new().await;
        fx.put("a.txt", b"x", "1h").await;

        // A symlink to itself fails to open with ELOOP, not NotFound
        let blob = fx.store.blob_dir().join("a.txt");
        fs::remove_file(&blob).await.unwrap();
        std::os::unix::fs::symlink("a.txt", &blob).unwrap();

        let err = fx.store.get("a.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::StorageIo { op: "open", .. }));
        assert!(!err.is_client_error());

        let err = fx.store.stat("a.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::StorageIo { op: "exists", .. }));

        // The record is kept; only a confirmed missing blob is healed
        assert_eq!(fx.store.stats().await.active_files, 1);
    }

    #[tokio::test]
    async fn test_remove_twice_is_not_an_error() {
        let fx = Fixture::new().await;
        fx.put("a.txt", b"x", "1h").await;

        assert!(fx.store.remove("a.txt").await.unwrap());
        assert!(!fx.store.remove("a.txt").await.unwrap());
        assert!(!fx.on_disk("a.txt"));
        assert_eq!(fx.store.stats().await.active_files, 0);
    }

    #[tokio::test]
    async fn test_stale_eviction_leaves_newer_record() {
        let fx = Fixture::new().await;
        let old = fx.put("a.txt", b"old", "10s").await.record;
        assert!(fx.store.remove("a.txt").await.unwrap());

        fx.clock.advance(Duration::seconds(1));
        let new = fx.put("a.txt", b"new", "1h").await.record;
        assert_eq!(new.public_name, "a.txt");

        assert_eq!(fx.store.evict(&old).await, Eviction::AlreadyGone);
        let handle = fx.store.get("a.txt").await.unwrap();
        assert_eq!(read_all(handle).await, b"new");
    }

    #[tokio::test]
    async fn test_reconcile_removes_orphans_only() {
        let fx = Fixture::new().await;
        fx.put("kept.txt", b"kept", "1h").await;
        fs::write(fx.store.blob_dir().join("orphan.txt"), b"orphan")
            .await
            .unwrap();
        let pending = fx.stage("pending.txt", b"pending", "1h").await;

        assert_eq!(fx.store.reconcile().await.unwrap(), 1);
        assert!(fx.on_disk("kept.txt"));
        assert!(!fx.on_disk("orphan.txt"));
        assert!(pending.staged_path.exists());
    }

    #[tokio::test]
    async fn test_stats_track_index() {
        let fx = Fixture::new().await;
        assert_eq!(fx.store.stats().await.active_files, 0);

        fx.put("a.txt", b"123", "1h").await;
        fx.put("b.txt", b"4567", "1h").await;

        let stats = fx.store.stats().await;
        assert_eq!(stats.active_files, 2);
        assert_eq!(stats.total_bytes, 7);
    }
}
