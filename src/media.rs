//! Media targets and their cache keys.
//! Key format: `movie_{id}`, `show_{id}`, `season_{show_id}_{season}`.

use serde::{Deserialize, Serialize};

/// Kind of translatable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Show,
    Season,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Season => "season",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One translatable entity, identified by Trakt ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaTarget {
    Movie { id: u32 },
    Show { id: u32 },
    Season { show_id: u32, season: u32 },
}

impl MediaTarget {
    pub fn movie(id: u32) -> Self {
        MediaTarget::Movie { id }
    }

    pub fn show(id: u32) -> Self {
        MediaTarget::Show { id }
    }

    pub fn season(show_id: u32, season: u32) -> Self {
        MediaTarget::Season { show_id, season }
    }

    /// Build a target from loose parts. A season target needs a season number;
    /// the number is ignored for movies and shows.
    pub fn from_parts(kind: MediaKind, id: u32, season: Option<u32>) -> Option<Self> {
        match kind {
            MediaKind::Movie => Some(MediaTarget::Movie { id }),
            MediaKind::Show => Some(MediaTarget::Show { id }),
            MediaKind::Season => season.map(|season| MediaTarget::Season { show_id: id, season }),
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            MediaTarget::Movie { .. } => MediaKind::Movie,
            MediaTarget::Show { .. } => MediaKind::Show,
            MediaTarget::Season { .. } => MediaKind::Season,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        let key = match self {
            MediaTarget::Movie { id } => format!("movie_{id}"),
            MediaTarget::Show { id } => format!("show_{id}"),
            MediaTarget::Season { show_id, season } => format!("season_{show_id}_{season}"),
        };
        CacheKey(key)
    }
}

impl std::fmt::Display for MediaTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaTarget::Movie { id } => write!(f, "movie {id}"),
            MediaTarget::Show { id } => write!(f, "show {id}"),
            MediaTarget::Season { show_id, season } => write!(f, "show {show_id} season {season}"),
        }
    }
}

/// Opaque string key for one translatable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trakt id block as it appears on catalog entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIds {
    pub trakt: Option<u32>,
    pub slug: Option<String>,
    pub imdb: Option<String>,
    pub tmdb: Option<u32>,
}

/// Catalog movie summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Movie {
    pub title: Option<String>,
    pub year: Option<u32>,
    #[serde(default)]
    pub ids: MediaIds,
}

/// Catalog show summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Show {
    pub title: Option<String>,
    pub year: Option<u32>,
    #[serde(default)]
    pub ids: MediaIds,
}

/// Anything that can be resolved to a translation target.
/// Entries without a Trakt id yield `None` and are never looked up.
pub trait Translatable {
    fn media_target(&self) -> Option<MediaTarget>;
}

impl Translatable for MediaTarget {
    fn media_target(&self) -> Option<MediaTarget> {
        Some(*self)
    }
}

impl Translatable for Movie {
    fn media_target(&self) -> Option<MediaTarget> {
        self.ids.trakt.map(MediaTarget::movie)
    }
}

impl Translatable for Show {
    fn media_target(&self) -> Option<MediaTarget> {
        self.ids.trakt.map(MediaTarget::show)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_follow_entity_layout() {
        assert_eq!(MediaTarget::movie(603).cache_key().as_str(), "movie_603");
        assert_eq!(MediaTarget::show(1).cache_key().as_str(), "show_1");
        assert_eq!(MediaTarget::season(1390, 2).cache_key().as_str(), "season_1390_2");
    }

    #[test]
    fn season_requires_number() {
        assert_eq!(MediaTarget::from_parts(MediaKind::Season, 7, None), None);
        assert_eq!(
            MediaTarget::from_parts(MediaKind::Season, 7, Some(3)),
            Some(MediaTarget::season(7, 3))
        );
        assert_eq!(
            MediaTarget::from_parts(MediaKind::Movie, 7, Some(3)),
            Some(MediaTarget::movie(7))
        );
    }

    #[test]
    fn catalog_entries_without_trakt_id_are_skipped() {
        let movie: Movie = serde_json::from_str(
            r#"{"title":"The Matrix","year":1999,"ids":{"trakt":481,"slug":"the-matrix-1999"}}"#,
        )
        .unwrap();
        assert_eq!(movie.media_target(), Some(MediaTarget::movie(481)));

        let show: Show = serde_json::from_str(r#"{"title":"Untracked"}"#).unwrap();
        assert_eq!(show.media_target(), None);
    }
}
