//! Raw listing title → canonical movie title plus metadata.
//!
//! Resolution order: cleaned title on the metadata search, then the
//! aggressively re-cleaned title, then the secondary web lookup. Results are
//! memoized per raw title for the life of the resolver, and metadata per
//! resolved title. Concurrent callers for the same key share one lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{Datelike, Local};
use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::imdb::ImdbFallback;
use crate::title::{clean_title, reclean_title};
use crate::tmdb::{MovieDetails, TmdbClient};
use crate::{CanonicalMovie, ResolvedMovie};

/// Metadata lookup settings
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub tmdb_api_base: String,
    pub tmdb_api_key: String,
    /// Wait before retrying a rate-limited request
    pub rate_limit_delay: Duration,
    /// `None` retries rate-limited requests forever
    pub max_rate_limit_retries: Option<u32>,
    pub fallback_search_base: String,
    /// Prefix of a listing URL; the listing id and `/` are appended
    pub listing_base: String,
    /// Year added to fallback searches
    pub search_year: i32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tmdb_api_base: "https://api.themoviedb.org/3".to_string(),
            tmdb_api_key: String::new(),
            rate_limit_delay: Duration::from_secs(10),
            max_rate_limit_retries: None,
            fallback_search_base: "https://duckduckgo.com/".to_string(),
            listing_base: "http://www.imdb.com/title/".to_string(),
            search_year: Local::now().year(),
        }
    }
}

/// Shared memo table. Each key gets one cell; a failed initialization leaves
/// the cell empty so a later call retries.
pub trait ResolutionCache<V>: Send + Sync {
    fn slot(&self, key: &str) -> Arc<OnceCell<V>>;
}

/// Process-lifetime cache: never evicted.
pub struct MemoryCache<V> {
    slots: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Send + Sync> ResolutionCache<V> for MemoryCache<V> {
    fn slot(&self, key: &str) -> Arc<OnceCell<V>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.to_string()).or_default())
    }
}

pub struct TitleResolver {
    tmdb: TmdbClient,
    fallback: ImdbFallback,
    titles: Arc<dyn ResolutionCache<String>>,
    details: Arc<dyn ResolutionCache<Option<MovieDetails>>>,
}

impl TitleResolver {
    pub fn new(client: Client, config: ResolverConfig) -> Self {
        Self {
            tmdb: TmdbClient::new(client.clone(), &config),
            fallback: ImdbFallback::new(client, &config),
            titles: Arc::new(MemoryCache::default()),
            details: Arc::new(MemoryCache::default()),
        }
    }

    /// Share memo tables across resolvers.
    pub fn with_caches(
        mut self,
        titles: Arc<dyn ResolutionCache<String>>,
        details: Arc<dyn ResolutionCache<Option<MovieDetails>>>,
    ) -> Self {
        self.titles = titles;
        self.details = details;
        self
    }

    /// Canonical title for a raw listing title.
    pub async fn resolve_title(&self, raw: &str) -> Result<String> {
        let slot = self.titles.slot(raw);
        let title = slot.get_or_try_init(|| self.lookup_title(raw)).await?;
        Ok(title.clone())
    }

    async fn lookup_title(&self, raw: &str) -> Result<String> {
        let cleaned = clean_title(raw);
        if cleaned.is_empty() {
            warn!("{raw:?} is empty after cleaning");
            return Ok(raw.trim().to_string());
        }

        let title = match self.first_match(&cleaned).await {
            Err(Error::NoMetadataMatch(_)) => {
                let recleaned = reclean_title(&cleaned);
                let query = if recleaned.is_empty() { &cleaned } else { &recleaned };
                match self.first_match(query).await {
                    Err(Error::NoMetadataMatch(_)) => self.fall_back(query, &cleaned).await,
                    other => other?,
                }
            }
            other => other?,
        };
        info!("{raw:?} → {title:?}");
        Ok(title)
    }

    async fn first_match(&self, query: &str) -> Result<String> {
        let results = self.tmdb.search(query).await?;
        if results.total_results == 0 {
            return Err(Error::NoMetadataMatch(query.to_string()));
        }
        results
            .results
            .into_iter()
            .next()
            .map(|hit| hit.title)
            .ok_or_else(|| Error::NoMetadataMatch(query.to_string()))
    }

    /// Secondary lookup; any failure keeps the cleaned title.
    async fn fall_back(&self, query: &str, cleaned: &str) -> String {
        match self.fallback.lookup(query).await {
            Ok(title) => title,
            Err(err) => {
                warn!("fallback lookup for {query:?} failed, keeping {cleaned:?}: {err}");
                cleaned.to_string()
            }
        }
    }

    /// Detail record of the first search match for a resolved title.
    pub async fn details(&self, title: &str) -> Result<Option<MovieDetails>> {
        let slot = self.details.slot(title);
        let details = slot.get_or_try_init(|| self.lookup_details(title)).await?;
        Ok(details.clone())
    }

    async fn lookup_details(&self, title: &str) -> Result<Option<MovieDetails>> {
        if title.is_empty() {
            return Ok(None);
        }
        let results = self.tmdb.search(title).await?;
        let Some(hit) = results.results.first() else {
            debug!("no metadata for {title:?}");
            return Ok(None);
        };
        Ok(Some(self.tmdb.movie(hit.id).await?))
    }

    pub async fn genre(&self, title: &str) -> Result<Option<String>> {
        Ok(self.details(title).await?.and_then(|d| d.genre()))
    }

    pub async fn rating(&self, title: &str) -> Result<Option<String>> {
        Ok(self.details(title).await?.and_then(|d| d.rating()))
    }

    pub async fn country(&self, title: &str) -> Result<Option<String>> {
        Ok(self.details(title).await?.and_then(|d| d.country()))
    }

    /// Resolve the title, then fetch genre, rating and country together.
    pub async fn resolve(&self, movie: CanonicalMovie) -> Result<ResolvedMovie> {
        let title = self.resolve_title(&movie.raw_title).await?;
        let (genre, rating, country) =
            tokio::try_join!(self.genre(&title), self.rating(&title), self.country(&title))?;
        Ok(ResolvedMovie {
            movie,
            title,
            genre,
            rating,
            country,
        })
    }
}
