//! Scraper for Filmgarde Cineplexes (Vista internet ticketing).
//! Listing: http://tickets.fgcineplex.com.sg/visInternetTicketing/
//! Same postback flow as Shaw, but the date list is `ddlFilterDate` with
//! year-less `DD MMM` values and its `onchange` handler does the submit.

use chrono::NaiveDate;
use reqwest::Client;
use scraper::{ElementRef, Html};
use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::normalize::{RawCinema, RawMovie, RawTree, normalize_time, normalize_yearless_date};
use crate::postback::{self, PostbackSite};
use crate::session::{SharedSessions, script_call, with_session};
use crate::{SiteAdapter, Timing, absolute_url, element_text, selector};

pub const FILMGARDE_URL: &str = "http://tickets.fgcineplex.com.sg/visInternetTicketing/";

const OPTION_DATE_FORMAT: &str = "%d %b";

const CINEMA_ROW_CLASS: &str = "ShowtimesCinemaRow";

const SELECT_DATE_SCRIPT: &str = "function(date) {
    var select = document.querySelector('[name=\"ddlFilterDate\"]');
    select.value = date;
    select.onchange();
    return true;
}";

#[derive(Debug, Clone)]
struct FilmgardeSite {
    listing_url: String,
    reference: NaiveDate,
}

impl PostbackSite for FilmgardeSite {
    fn listing_url(&self) -> &str {
        &self.listing_url
    }

    fn date_values(&self, html: &str) -> Result<Vec<String>> {
        parse_date_options(html)
    }

    fn date_for(&self, value: &str) -> Option<String> {
        normalize_yearless_date(value, OPTION_DATE_FORMAT, self.reference)
    }

    fn select_script(&self, value: &str) -> String {
        script_call(SELECT_DATE_SCRIPT, &[json!(value)])
    }

    fn parse_day(&self, html: &str) -> Result<Vec<RawCinema>> {
        parse_day(html, &self.listing_url)
    }
}

/// Filmgarde adapter
pub struct FilmgardeScraper {
    site: FilmgardeSite,
    sessions: SharedSessions,
}

impl FilmgardeScraper {
    /// `reference` supplies the year for the selector's year-less dates.
    pub fn new(sessions: SharedSessions, reference: NaiveDate) -> Self {
        Self {
            site: FilmgardeSite {
                listing_url: FILMGARDE_URL.to_string(),
                reference,
            },
            sessions,
        }
    }
}

#[async_trait::async_trait]
impl SiteAdapter for FilmgardeScraper {
    fn name(&self) -> &'static str {
        "filmgarde"
    }

    async fn fetch_raw(&self, _client: &Client) -> Result<RawTree> {
        info!("filmgarde: paginating {}", self.site.listing_url);
        let site = self.site.clone();
        let dates = with_session(self.sessions.as_ref(), move |session| {
            Box::pin(async move { postback::paginate(&site, session).await })
        })
        .await?;
        info!("filmgarde: {} dates", dates.len());
        Ok(RawTree::ByDate(dates))
    }
}

pub fn parse_date_options(html: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let option_sel = selector("#ddlFilterDate option")?;
    Ok(doc
        .select(&option_sel)
        .filter_map(|o| o.value().attr("value"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

/// Cinema rows are followed by one sibling row per movie, up to the next
/// cinema row.
pub fn parse_day(html: &str, base: &str) -> Result<Vec<RawCinema>> {
    let doc = Html::parse_document(html);
    let row_sel = selector(&format!(".{CINEMA_ROW_CLASS}"))?;
    let movie_sel = selector(".ShowtimesMovieLink")?;
    let session_sel = selector(".ShowtimesSessionLink")?;

    let mut cinemas = Vec::new();
    for row in doc.select(&row_sel) {
        let mut movies = Vec::new();
        for sibling in row.next_siblings().filter_map(ElementRef::wrap) {
            if sibling.value().classes().any(|c| c == CINEMA_ROW_CLASS) {
                break;
            }
            let title = sibling
                .select(&movie_sel)
                .next()
                .map(|el| element_text(&el))
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }
            let mut timings = Vec::new();
            for a in sibling.select(&session_sel) {
                let Some(href) = a.value().attr("href") else {
                    continue;
                };
                timings.push(Timing {
                    time: normalize_time(&element_text(&a)),
                    url: absolute_url(base, href)?,
                });
            }
            movies.push(RawMovie { title, timings });
        }
        cinemas.push(RawCinema {
            name: element_text(&row),
            movies,
        });
    }
    Ok(cinemas)
}
