//! Showtime aggregation for five Singapore cinema chains.
//!
//! Each chain has a [`SiteAdapter`] that drives its site (a live browser
//! session or a plain HTTP fetch) into a raw tree, which [`normalize`] folds
//! into [`CanonicalMovie`] entries. The [`aggregate`] stage resolves every raw
//! title through [`resolver::TitleResolver`] and flattens the result into one
//! sorted list of [`ShowtimeRecord`]s.

pub mod aggregate;
pub mod catalog;
pub mod cathay;
pub mod error;
pub mod filmgarde;
pub mod golden_village;
pub mod imdb;
pub mod logging;
pub mod normalize;
pub mod postback;
pub mod resolver;
pub mod session;
pub mod shaw;
pub mod title;
pub mod tmdb;
pub mod we_cinemas;

pub use error::{Error, Result};

use reqwest::{Client, header};
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};

use crate::normalize::RawTree;

/// Browser-like User-Agent sent with every direct page fetch
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// One bookable showing: local clock time plus an absolute booking URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub time: String,
    pub url: String,
}

/// Showings of one movie at one cinema on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CinemaTimings {
    pub name: String,
    pub timings: Vec<Timing>,
}

/// All cinemas showing a movie on one calendar day (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieDate {
    pub date: String,
    pub cinemas: Vec<CinemaTimings>,
}

/// One distinct raw title within a single source, dates in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMovie {
    pub raw_title: String,
    pub dates: Vec<MovieDate>,
}

/// A canonical movie after title resolution and metadata enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMovie {
    #[serde(flatten)]
    pub movie: CanonicalMovie,
    pub title: String,
    pub genre: Option<String>,
    pub rating: Option<String>,
    pub country: Option<String>,
}

/// Final unit of output: one row per (cinema, date, timing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowtimeRecord {
    pub cinema: String,
    pub movie: String,
    pub date: String,
    pub time: String,
    pub url: String,
    pub genre: Option<String>,
    pub rating: Option<String>,
    pub country: Option<String>,
}

/// Capability every cinema chain implements.
///
/// Adding a source means implementing this trait and registering the adapter
/// in [`aggregate::registry`]; the engine itself never changes.
#[async_trait::async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Short stable name used in logs and failure reports
    fn name(&self) -> &'static str;

    /// Drive the site and return its listings in the site's own nesting order
    async fn fetch_raw(&self, client: &Client) -> Result<RawTree>;

    /// Fetch and fold into canonical movies
    async fn fetch_movies(&self, client: &Client) -> Result<Vec<CanonicalMovie>> {
        let raw = self.fetch_raw(client).await?;
        Ok(normalize::normalize(raw))
    }
}

/// Serialize an artifact (flat list or catalog) as pretty JSON.
pub fn render_artifact<T: Serialize>(artifact: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(artifact)?)
}

/// Render `artifact` and write it to `path`, replacing any previous file.
pub fn write_artifact<T: Serialize>(path: &std::path::Path, artifact: &T) -> Result<()> {
    std::fs::write(path, render_artifact(artifact)?)?;
    Ok(())
}

/// GET a page with the browser User-Agent and return its body.
pub(crate) async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    let body = client
        .get(url)
        .header(header::USER_AGENT, USER_AGENT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Parse(format!("selector {css}: {e}")))
}

/// Element text with whitespace runs collapsed to single spaces.
pub(crate) fn element_text(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `href` against the page it was found on.
pub(crate) fn absolute_url(base: &str, href: &str) -> Result<String> {
    let base = url::Url::parse(base)?;
    Ok(base.join(href.trim())?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_absolute_url_relative_path() {
        let url = absolute_url("http://m.shaw.sg/", "ShowtimesByMovie.aspx?id=1").unwrap();
        assert_eq!(url, "http://m.shaw.sg/ShowtimesByMovie.aspx?id=1");
    }

    #[test]
    fn test_absolute_url_keeps_absolute() {
        let url = absolute_url("http://m.shaw.sg/", "https://booking.example.com/a").unwrap();
        assert_eq!(url, "https://booking.example.com/a");
    }

    #[test]
    fn test_write_artifact_writes_pretty_json() {
        let path = std::env::temp_dir().join(format!("showtimes-artifact-{}.json", std::process::id()));
        write_artifact(&path, &serde_json::json!({"showtimes": []})).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, "{\n  \"showtimes\": []\n}");
    }

    #[test]
    fn test_write_artifact_reports_io_errors() {
        let path = std::env::temp_dir().join("showtimes-missing-dir").join("nested").join("out.json");
        let err = write_artifact(&path, &Vec::<ShowtimeRecord>::new()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_absolute_url_rejects_bad_base() {
        assert!(matches!(absolute_url("not a url", "/x"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_element_text_collapses_whitespace() {
        let doc = Html::parse_fragment("<p>  Finding \n\t <b>Dory</b>  </p>");
        let p = doc.select(&selector("p").unwrap()).next().unwrap();
        assert_eq!(element_text(&p), "Finding Dory");
    }

    #[test]
    fn test_canonical_movie_field_names() {
        let movie = CanonicalMovie {
            raw_title: "Cars 3".to_string(),
            dates: vec![],
        };
        let json = serde_json::to_value(&movie).unwrap();
        assert_eq!(json["rawTitle"], "Cars 3");
    }
}
