//! In-memory translation store.
//! A key is absent, resolved (kept for the session) or failed (kept until its
//! negative TTL runs out, then treated as absent again).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::backend::TranslationData;
use crate::media::CacheKey;

/// Localized text for one entity. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub title: Option<String>,
    pub overview: Option<String>,
    pub tagline: Option<String>,
}

impl From<TranslationData> for TranslationResult {
    fn from(data: TranslationData) -> Self {
        Self {
            title: data.title,
            overview: data.overview,
            tagline: data.tagline,
        }
    }
}

enum CacheEntry {
    /// Backend answered; `None` means it has no translation for this entity.
    Resolved(Option<TranslationResult>),
    /// Fetch failed or timed out.
    Failed { expires_at: Instant },
}

/// Result of a store lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(Option<TranslationResult>),
    Absent,
}

pub struct TranslationStore {
    entries: HashMap<CacheKey, CacheEntry>,
    negative_ttl: Duration,
}

impl TranslationStore {
    pub fn new(negative_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            negative_ttl,
        }
    }

    /// Live entry for `key`. An expired negative entry is dropped on the way.
    pub fn lookup(&mut self, key: &CacheKey, now: Instant) -> Lookup {
        let lapsed = match self.entries.get(key) {
            Some(CacheEntry::Resolved(value)) => return Lookup::Hit(value.clone()),
            Some(CacheEntry::Failed { expires_at }) if now < *expires_at => {
                return Lookup::Hit(None)
            }
            Some(CacheEntry::Failed { .. }) => true,
            None => false,
        };
        if lapsed {
            self.entries.remove(key);
        }
        Lookup::Absent
    }

    pub fn contains_live(&self, key: &CacheKey, now: Instant) -> bool {
        match self.entries.get(key) {
            Some(CacheEntry::Resolved(_)) => true,
            Some(CacheEntry::Failed { expires_at }) => now < *expires_at,
            None => false,
        }
    }

    pub fn resolve(&mut self, key: CacheKey, value: Option<TranslationResult>) {
        self.entries.insert(key, CacheEntry::Resolved(value));
    }

    /// Record a failure; returns when the negative entry lapses.
    pub fn fail(&mut self, key: CacheKey, now: Instant) -> Instant {
        let expires_at = now + self.negative_ttl;
        self.entries.insert(key, CacheEntry::Failed { expires_at });
        expires_at
    }

    /// Remove the negative entry written with `expires_at`. No-op if the key is
    /// absent or has since been replaced.
    pub fn expire(&mut self, key: &CacheKey, expires_at: Instant) -> bool {
        let matches = matches!(
            self.entries.get(key),
            Some(CacheEntry::Failed { expires_at: at }) if *at == expires_at
        );
        if matches {
            self.entries.remove(key);
        }
        matches
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
