//! Scraper for Cathay Cineplexes.
//! Listing: http://www.cathaycineplexes.com.sg/showtimes/
//! One static page carries every date: each cinema is a `.tabs` block whose
//! `.tabbers` panels are labelled by the tab holding that panel's date.

use chrono::NaiveDate;
use reqwest::Client;
use scraper::{ElementRef, Html};
use tracing::{info, warn};

use crate::error::Result;
use crate::normalize::{RawCinemaDates, RawDateMovies, RawMovie, RawTree, normalize_time, normalize_yearless_date};
use crate::{SiteAdapter, Timing, absolute_url, element_text, fetch_page, selector};

pub const CATHAY_URL: &str = "http://www.cathaycineplexes.com.sg/showtimes/";

/// Name used when a block carries no cinema heading
const UNNAMED_HALL: &str = "PLATINUM MOVIE SUITES";

const TAB_DATE_FORMAT: &str = "%d %b";

/// Cathay Cineplexes adapter
pub struct CathayScraper {
    listing_url: String,
    reference: NaiveDate,
}

impl CathayScraper {
    pub fn new(reference: NaiveDate) -> Self {
        Self::with_listing_url(CATHAY_URL.to_string(), reference)
    }

    pub fn with_listing_url(listing_url: String, reference: NaiveDate) -> Self {
        Self {
            listing_url,
            reference,
        }
    }
}

#[async_trait::async_trait]
impl SiteAdapter for CathayScraper {
    fn name(&self) -> &'static str {
        "cathay"
    }

    async fn fetch_raw(&self, client: &Client) -> Result<RawTree> {
        info!("cathay: fetching {}", self.listing_url);
        let body = fetch_page(client, &self.listing_url).await?;
        let cinemas = parse_showtimes(&body, &self.listing_url, self.reference)?;
        info!("cathay: {} cinemas", cinemas.len());
        Ok(RawTree::ByCinema(cinemas))
    }
}

pub fn parse_showtimes(html: &str, base: &str, reference: NaiveDate) -> Result<Vec<RawCinemaDates>> {
    let doc = Html::parse_document(html);
    let block_sel = selector(".tabs")?;
    let name_sel = selector(".M_movietitle")?;
    let panel_sel = selector(".tabbers")?;

    let mut cinemas = Vec::new();
    for block in doc.select(&block_sel) {
        let name = block
            .select(&name_sel)
            .next()
            .map(|el| element_text(&el))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNNAMED_HALL.to_string());

        let mut dates = Vec::new();
        for panel in block.select(&panel_sel) {
            let label = panel_date_label(&panel)?;
            let Some(date) = normalize_yearless_date(&label, TAB_DATE_FORMAT, reference) else {
                warn!("cathay: skipping {name} panel with date {label:?}");
                continue;
            };
            dates.push(RawDateMovies {
                date,
                movies: parse_panel(&panel, base)?,
            });
        }
        cinemas.push(RawCinemaDates { name, dates });
    }
    Ok(cinemas)
}

/// Text of `.smalldate` inside the sibling tab named by `aria-labelledby`.
fn panel_date_label(panel: &ElementRef) -> Result<String> {
    let Some(label_id) = panel.value().attr("aria-labelledby") else {
        return Ok(String::new());
    };
    let Some(parent) = panel.parent().and_then(ElementRef::wrap) else {
        return Ok(String::new());
    };
    let escaped = label_id.replace('\\', "\\\\").replace('"', "\\\"");
    let date_sel = selector(&format!("[id=\"{escaped}\"] .smalldate"))?;
    Ok(parent
        .select(&date_sel)
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default())
}

fn parse_panel(panel: &ElementRef, base: &str) -> Result<Vec<RawMovie>> {
    let container_sel = selector(".movie-container")?;
    let title_sel = selector(".mobileLink")?;
    let time_sel = selector(".cine_time")?;

    let mut movies = Vec::new();
    for container in panel.select(&container_sel) {
        let title = container
            .select(&title_sel)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();
        if title.is_empty() {
            continue;
        }
        let mut timings = Vec::new();
        for a in container.select(&time_sel) {
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
    Ok(movies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = include_str!("../tests/fixtures/cathay.html");
    const EXPECTED: &str = include_str!("../tests/fixtures/cathay_expected.json");

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 6, 20).unwrap()
    }

    #[test]
    fn test_parse_reads_dates_from_labelling_tabs() {
        let cinemas = parse_showtimes(PAGE, CATHAY_URL, reference()).unwrap();
        assert_eq!(cinemas.len(), 2);
        let days: Vec<_> = cinemas[0].dates.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(days, ["2017-06-20", "2017-06-21"]);
    }

    #[test]
    fn test_unnamed_block_gets_suite_name() {
        let cinemas = parse_showtimes(PAGE, CATHAY_URL, reference()).unwrap();
        assert_eq!(cinemas[1].name, "PLATINUM MOVIE SUITES");
    }

    #[test]
    fn test_containers_without_title_are_dropped() {
        let html = r#"<div class="tabs"><div class="M_movietitle">JEM</div>
            <ul><li id="t1"><span class="smalldate">20 Jun</span></li></ul>
            <div class="tabbers" aria-labelledby="t1">
              <div class="movie-container"><a class="mobileLink"></a><a class="cine_time" href="/a">10:00</a></div>
              <div class="movie-container"><a class="mobileLink">Cars 3</a><a class="cine_time" href="/b">11:00</a></div>
            </div></div>"#;
        let cinemas = parse_showtimes(html, CATHAY_URL, reference()).unwrap();
        let movies = &cinemas[0].dates[0].movies;
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Cars 3");
    }

    #[test]
    fn test_canonical_tree_matches_fixture() {
        let cinemas = parse_showtimes(PAGE, CATHAY_URL, reference()).unwrap();
        let movies = normalize(RawTree::ByCinema(cinemas));

        let actual = serde_json::to_value(&movies).unwrap();
        let expected: serde_json::Value = serde_json::from_str(EXPECTED).unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_fetch_counts_every_showing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/showtimes/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let adapter = CathayScraper::with_listing_url(format!("{}/showtimes/", server.uri()), reference());
        let raw = adapter.fetch_raw(&Client::new()).await.unwrap();

        assert_eq!(raw.timing_count(), PAGE.matches("class=\"cine_time\"").count());
    }
}
