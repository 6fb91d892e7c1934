//! MyTV translation layer: localized titles, overviews and taglines for
//! movies, shows and seasons, fetched through a bounded, deduplicating cache.

pub mod backend;
pub mod cache;
pub mod config;
pub mod deadline;
pub mod epoch;
pub mod gate;
pub mod media;
pub mod metrics;
pub mod preload;
pub mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub use backend::{BackendError, PersistentBackend, StoreStats, TranslationBackend, TranslationData};
pub use cache::{ConcurrencyStats, TranslationCache, TranslationResult};
pub use config::{ConfigError, TranslationConfig};
pub use media::{CacheKey, MediaKind, MediaTarget, Translatable};
pub use preload::PreloadReport;

use backend::sqlite::SqliteTranslationStore;
use backend::trakt::TraktClient;

/// Cache wired to SQLite and the Trakt API.
pub type TraktTranslationCache = TranslationCache<PersistentBackend<TraktClient>>;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once; later calls are ignored.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mytv_translation=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Open the persistent store, start its hourly cleanup and build the cache.
/// Needs `TRAKT_CLIENT_ID` in the environment.
pub fn open_translation_cache(
    config: TranslationConfig,
    db_path: &Path,
) -> Result<TraktTranslationCache, BackendError> {
    let store = Arc::new(SqliteTranslationStore::open(db_path)?.with_ttl(config.store_ttl()));
    SqliteTranslationStore::start_cleanup_loop(Arc::clone(&store), Duration::from_secs(3600))?;

    let client = TraktClient::new(&config.language)?;
    info!(
        max_concurrent = config.max_concurrent,
        language = %config.language,
        "translation cache ready"
    );
    Ok(TranslationCache::new(PersistentBackend::new(store, client), config))
}
