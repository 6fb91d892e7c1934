//! Backend collaborators behind the translation cache.
//!
//! The cache only sees [`TranslationBackend`]. [`PersistentBackend`] is the
//! production implementation: SQLite first, then the upstream
//! [`TranslationSource`] (Trakt), with found payloads written back.

pub mod sqlite;
pub mod trakt;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::media::MediaTarget;
use self::sqlite::SqliteTranslationStore;

/// Translation payload returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationData {
    pub title: Option<String>,
    pub overview: Option<String>,
    pub tagline: Option<String>,
    /// Unix milliseconds.
    pub updated_at: u64,
}

/// One per-country translation as listed by the upstream source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpstreamTranslation {
    pub title: Option<String>,
    pub overview: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
}

/// Row counts of the persistent store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: u32,
    pub expired: u32,
}

#[derive(Debug)]
pub enum BackendError {
    Http(String),
    Status(u16),
    Decode(String),
    Storage(String),
    Config(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Http(msg) => write!(f, "HTTP error: {msg}"),
            BackendError::Status(code) => write!(f, "unexpected status {code}"),
            BackendError::Decode(msg) => write!(f, "decode error: {msg}"),
            BackendError::Storage(msg) => write!(f, "storage error: {msg}"),
            BackendError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// What the translation cache needs from the outside world.
pub trait TranslationBackend: Send + Sync + 'static {
    /// `Ok(None)` means the backend has no translation for this target.
    fn fetch_translation(
        &self,
        target: MediaTarget,
    ) -> impl Future<Output = Result<Option<TranslationData>, BackendError>> + Send;

    /// Drop expired rows from the backend's own storage; returns rows removed.
    fn clear_expired(&self) -> impl Future<Output = Result<u32, BackendError>> + Send;

    fn store_stats(&self) -> impl Future<Output = Result<StoreStats, BackendError>> + Send;
}

/// Upstream list of translations for a target.
pub trait TranslationSource: Send + Sync + 'static {
    fn translations(
        &self,
        target: MediaTarget,
    ) -> impl Future<Output = Result<Vec<UpstreamTranslation>, BackendError>> + Send;
}

/// Pick the preferred translation: mainland China, then Taiwan, then Hong
/// Kong, then whatever comes first.
pub fn pick_preferred(translations: &[UpstreamTranslation]) -> Option<&UpstreamTranslation> {
    ["cn", "tw", "hk"]
        .iter()
        .find_map(|country| {
            translations
                .iter()
                .find(|t| t.country.as_deref() == Some(*country))
        })
        .or_else(|| translations.first())
}

/// Reduce an upstream list to one payload. Seasons carry no tagline.
pub fn to_translation_data(
    target: MediaTarget,
    translations: &[UpstreamTranslation],
    updated_at: u64,
) -> Option<TranslationData> {
    pick_preferred(translations).map(|t| TranslationData {
        title: t.title.clone(),
        overview: t.overview.clone(),
        tagline: match target {
            MediaTarget::Season { .. } => None,
            _ => t.tagline.clone(),
        },
        updated_at,
    })
}

/// Store-first backend: persistent rows short-circuit the upstream call.
pub struct PersistentBackend<S> {
    store: Arc<SqliteTranslationStore>,
    source: S,
}

impl<S: TranslationSource> PersistentBackend<S> {
    pub fn new(store: Arc<SqliteTranslationStore>, source: S) -> Self {
        Self { store, source }
    }

    pub fn store(&self) -> &Arc<SqliteTranslationStore> {
        &self.store
    }
}

impl<S: TranslationSource> TranslationBackend for PersistentBackend<S> {
    async fn fetch_translation(
        &self,
        target: MediaTarget,
    ) -> Result<Option<TranslationData>, BackendError> {
        let key = target.cache_key();
        let found = {
            let store = Arc::clone(&self.store);
            let key = key.clone();
            blocking(move || store.get(&key)).await?
        };
        if let Some(data) = found {
            debug!(key = %key, "persistent store hit");
            return Ok(Some(data));
        }

        let translations = self.source.translations(target).await?;
        let data = to_translation_data(target, &translations, sqlite::now_millis());
        if let Some(ref data) = data {
            let store = Arc::clone(&self.store);
            let row = data.clone();
            blocking(move || store.insert(&key, &row)).await?;
        }
        Ok(data)
    }

    async fn clear_expired(&self) -> Result<u32, BackendError> {
        let store = Arc::clone(&self.store);
        blocking(move || store.cleanup_expired()).await
    }

    async fn store_stats(&self) -> Result<StoreStats, BackendError> {
        let store = Arc::clone(&self.store);
        blocking(move || store.stats()).await
    }
}

/// Run a SQLite call on the blocking pool; the connection mutex may be held
/// by the cleanup thread for a whole `DELETE`.
async fn blocking<T, F>(work: F) -> Result<T, BackendError>
where
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BackendError::Storage(format!("store task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn entry(country: &str, title: &str) -> UpstreamTranslation {
        UpstreamTranslation {
            title: Some(title.into()),
            tagline: Some(format!("{title} tagline")),
            language: Some("zh".into()),
            country: Some(country.into()),
            ..Default::default()
        }
    }

    #[test]
    fn prefers_mainland_then_taiwan_then_hong_kong() {
        let list = vec![entry("sg", "新"), entry("hk", "港"), entry("tw", "台")];
        assert_eq!(pick_preferred(&list).unwrap().title.as_deref(), Some("台"));

        let list = vec![entry("hk", "港"), entry("cn", "陆")];
        assert_eq!(pick_preferred(&list).unwrap().title.as_deref(), Some("陆"));

        let list = vec![entry("sg", "新")];
        assert_eq!(pick_preferred(&list).unwrap().title.as_deref(), Some("新"));

        assert!(pick_preferred(&[]).is_none());
    }

    #[test]
    fn seasons_drop_tagline() {
        let list = vec![entry("cn", "第一季")];
        let data = to_translation_data(MediaTarget::season(1, 1), &list, 7).unwrap();
        assert_eq!(data.tagline, None);
        assert_eq!(data.updated_at, 7);

        let data = to_translation_data(MediaTarget::movie(1), &list, 7).unwrap();
        assert_eq!(data.tagline.as_deref(), Some("第一季 tagline"));
    }

    struct CountingSource {
        calls: AtomicUsize,
        list: Vec<UpstreamTranslation>,
    }

    impl TranslationSource for CountingSource {
        async fn translations(
            &self,
            _target: MediaTarget,
        ) -> Result<Vec<UpstreamTranslation>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.list.clone())
        }
    }

    #[tokio::test]
    async fn persistent_backend_writes_back_and_reuses_rows() {
        let store = Arc::new(SqliteTranslationStore::open_in_memory().unwrap());
        let backend = PersistentBackend::new(
            Arc::clone(&store),
            CountingSource {
                calls: AtomicUsize::new(0),
                list: vec![entry("cn", "黑客帝国")],
            },
        );

        let first = backend.fetch_translation(MediaTarget::movie(603)).await.unwrap();
        let second = backend.fetch_translation(MediaTarget::movie(603)).await.unwrap();
        assert_eq!(first.as_ref().and_then(|d| d.title.as_deref()), Some("黑客帝国"));
        assert_eq!(second.and_then(|d| d.title), Some("黑客帝国".to_string()));
        assert_eq!(backend.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.store_stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn locked_store_does_not_stall_the_runtime() {
        let store = Arc::new(SqliteTranslationStore::open_in_memory().unwrap());
        let backend = Arc::new(PersistentBackend::new(
            Arc::clone(&store),
            CountingSource {
                calls: AtomicUsize::new(0),
                list: vec![entry("cn", "锁")],
            },
        ));

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let _conn = store.lock_connection();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(300));
            })
        };
        locked_rx.recv().unwrap();

        let fetch = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move { backend.fetch_translation(MediaTarget::movie(5)).await })
        };
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(!fetch.is_finished());

        let data = fetch.await.unwrap().unwrap();
        assert_eq!(data.and_then(|d| d.title).as_deref(), Some("锁"));
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn empty_upstream_list_is_not_persisted() {
        let store = Arc::new(SqliteTranslationStore::open_in_memory().unwrap());
        let backend = PersistentBackend::new(
            Arc::clone(&store),
            CountingSource {
                calls: AtomicUsize::new(0),
                list: Vec::new(),
            },
        );

        assert_eq!(backend.fetch_translation(MediaTarget::show(9)).await.unwrap(), None);
        assert_eq!(backend.fetch_translation(MediaTarget::show(9)).await.unwrap(), None);
        assert_eq!(backend.source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }
}
