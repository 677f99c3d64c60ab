//! Runs every adapter, resolves titles and flattens the result into one
//! sorted showtime list.

use std::time::Duration;

use chrono::NaiveDate;
use futures::future::{join_all, try_join_all};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::format_cinema;
use crate::cathay::CathayScraper;
use crate::error::{Error, Result};
use crate::filmgarde::FilmgardeScraper;
use crate::golden_village::GoldenVillageScraper;
use crate::resolver::TitleResolver;
use crate::session::SharedSessions;
use crate::shaw::ShawScraper;
use crate::we_cinemas::WeCinemasScraper;
use crate::{CanonicalMovie, ResolvedMovie, ShowtimeRecord, SiteAdapter};

/// Every supported chain. `reference` anchors year-less dates.
pub fn registry(
    sessions: SharedSessions,
    reference: NaiveDate,
    capture_timeout: Duration,
) -> Vec<Box<dyn SiteAdapter>> {
    vec![
        Box::new(CathayScraper::new(reference)),
        Box::new(FilmgardeScraper::new(sessions.clone(), reference)),
        Box::new(GoldenVillageScraper::new(sessions.clone(), capture_timeout)),
        Box::new(ShawScraper::new(sessions)),
        Box::new(WeCinemasScraper::new()),
    ]
}

/// An adapter that failed while the rest of the run went on.
#[derive(Debug, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: Error,
}

#[derive(Debug, Serialize)]
pub struct AggregationReport {
    pub showtimes: Vec<ShowtimeRecord>,
    pub failures: Vec<SourceFailure>,
}

pub struct AggregationEngine {
    adapters: Vec<Box<dyn SiteAdapter>>,
    client: Client,
    strict: bool,
}

impl AggregationEngine {
    pub fn new(adapters: Vec<Box<dyn SiteAdapter>>, client: Client) -> Self {
        Self {
            adapters,
            client,
            strict: false,
        }
    }

    /// In strict mode any adapter failure fails the run.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Fetch every source concurrently; canonical movies in adapter order.
    pub async fn collect(&self) -> Result<(Vec<CanonicalMovie>, Vec<SourceFailure>)> {
        let outcomes = join_all(self.adapters.iter().map(|adapter| async move {
            info!("{}: starting", adapter.name());
            (adapter.name(), adapter.fetch_movies(&self.client).await)
        }))
        .await;

        let mut movies = Vec::new();
        let mut failures = Vec::new();
        for (source, outcome) in outcomes {
            match outcome {
                Ok(found) => {
                    info!("{source}: {} movies", found.len());
                    movies.extend(found);
                }
                Err(err) => {
                    let err = Error::in_source(source, err);
                    if self.strict {
                        return Err(err);
                    }
                    warn!("{err}");
                    failures.push(SourceFailure {
                        source: source.to_string(),
                        error: err,
                    });
                }
            }
        }
        Ok((movies, failures))
    }

    /// Collect, resolve every title, flatten and sort.
    pub async fn run(&self, resolver: &TitleResolver) -> Result<AggregationReport> {
        let (movies, failures) = self.collect().await?;
        info!("resolving {} titles", movies.len());
        let resolved = try_join_all(movies.into_iter().map(|movie| resolver.resolve(movie))).await?;
        let showtimes = flatten(resolved);
        info!("{} showtimes", showtimes.len());
        Ok(AggregationReport {
            showtimes,
            failures,
        })
    }

    /// Like [`run`](Self::run) but keeps raw titles and leaves metadata empty.
    pub async fn run_unresolved(&self) -> Result<AggregationReport> {
        let (movies, failures) = self.collect().await?;
        let unresolved = movies
            .into_iter()
            .map(|movie| ResolvedMovie {
                title: movie.raw_title.clone(),
                movie,
                genre: None,
                rating: None,
                country: None,
            })
            .collect();
        Ok(AggregationReport {
            showtimes: flatten(unresolved),
            failures,
        })
    }
}

/// One record per timing, stably sorted by movie title.
pub fn flatten(movies: Vec<ResolvedMovie>) -> Vec<ShowtimeRecord> {
    let mut records = Vec::new();
    for resolved in movies {
        for day in &resolved.movie.dates {
            for cinema in &day.cinemas {
                let label = format_cinema(&cinema.name);
                for timing in &cinema.timings {
                    records.push(ShowtimeRecord {
                        cinema: label.clone(),
                        movie: resolved.title.clone(),
                        date: day.date.clone(),
                        time: timing.time.clone(),
                        url: timing.url.clone(),
                        genre: resolved.genre.clone(),
                        rating: resolved.rating.clone(),
                        country: resolved.country.clone(),
                    });
                }
            }
        }
    }
    records.sort_by(|a, b| a.movie.cmp(&b.movie));
    records
}
