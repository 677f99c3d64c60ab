//! Scraper for WE Cinemas.
//! Listing: https://www.wecinemas.com.sg/buy-ticket.aspx
//!
//! The buy-ticket page is an ASP.NET DataList: one table per cinema whose
//! rows are laid out positionally. A movie's `h3` row is followed by two
//! detail rows and then the row of showtime buttons. Every movie heading in
//! the table is listed under every date block of that table.

use reqwest::Client;
use scraper::{ElementRef, Html};
use tracing::{info, warn};

use crate::error::Result;
use crate::normalize::{RawCinemaDates, RawDateMovies, RawMovie, RawTree, normalize_date, normalize_time};
use crate::{SiteAdapter, Timing, absolute_url, element_text, fetch_page, selector};

pub const WE_CINEMAS_URL: &str = "https://www.wecinemas.com.sg/buy-ticket.aspx";

/// `20 June 2017, Tuesday`
const DATE_FORMAT: &str = "%d %B %Y, %A";

/// Rows between a movie heading and its showtime buttons
const SHOWTIME_ROW_OFFSET: usize = 3;

/// WE Cinemas adapter
pub struct WeCinemasScraper {
    listing_url: String,
}

impl WeCinemasScraper {
    pub fn new() -> Self {
        Self::with_listing_url(WE_CINEMAS_URL.to_string())
    }

    pub fn with_listing_url(listing_url: String) -> Self {
        Self { listing_url }
    }
}

impl Default for WeCinemasScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SiteAdapter for WeCinemasScraper {
    fn name(&self) -> &'static str {
        "we"
    }

    async fn fetch_raw(&self, client: &Client) -> Result<RawTree> {
        info!("we: fetching {}", self.listing_url);
        let body = fetch_page(client, &self.listing_url).await?;
        let cinemas = parse_showtimes(&body, &self.listing_url)?;
        info!("we: {} cinemas", cinemas.len());
        Ok(RawTree::ByCinema(cinemas))
    }
}

pub fn parse_showtimes(html: &str, base: &str) -> Result<Vec<RawCinemaDates>> {
    let doc = Html::parse_document(html);
    let heading_sel = selector("#DataListCinemas h2")?;
    let date_con_sel = selector(".showtime-date-con")?;
    let date_sel = selector(".showtime-date")?;

    let mut cinemas = Vec::new();
    for heading in doc.select(&heading_sel) {
        let name = element_text(&heading);
        let Some(table) = closest(&heading, "table") else {
            warn!("we: {name} is not inside a table");
            continue;
        };
        let movies = parse_movies(&table, base)?;

        let mut dates = Vec::new();
        for con in table.select(&date_con_sel) {
            let label = con.select(&date_sel).next().map(|el| element_text(&el)).unwrap_or_default();
            let Some(date) = normalize_date(&label, DATE_FORMAT) else {
                warn!("we: skipping {name} date {label:?}");
                continue;
            };
            dates.push(RawDateMovies {
                date,
                movies: movies.clone(),
            });
        }
        cinemas.push(RawCinemaDates { name, dates });
    }
    Ok(cinemas)
}

fn parse_movies(table: &ElementRef, base: &str) -> Result<Vec<RawMovie>> {
    let title_sel = selector("h3")?;
    let button_sel = selector(".showtimes-but")?;
    let link_sel = selector("a")?;

    let mut movies = Vec::new();
    for h3 in table.select(&title_sel) {
        let title = element_text(&h3);
        if title.is_empty() {
            continue;
        }
        let showtime_row = closest(&h3, "tr").and_then(|row| {
            row.next_siblings()
                .filter_map(ElementRef::wrap)
                .nth(SHOWTIME_ROW_OFFSET - 1)
        });

        let mut timings = Vec::new();
        if let Some(row) = showtime_row {
            for button in row.select(&button_sel) {
                let Some(href) = button
                    .select(&link_sel)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                else {
                    continue;
                };
                timings.push(Timing {
                    time: normalize_time(&element_text(&button)),
                    url: absolute_url(base, href)?,
                });
            }
        }
        movies.push(RawMovie { title, timings });
    }
    Ok(movies)
}

/// Nearest ancestor element with the given tag name.
fn closest<'a>(el: &ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = include_str!("../tests/fixtures/we_cinemas.html");
    const EXPECTED: &str = include_str!("../tests/fixtures/we_cinemas_expected.json");

    #[test]
    fn test_showtimes_come_from_third_row_after_heading() {
        let cinemas = parse_showtimes(PAGE, WE_CINEMAS_URL).unwrap();
        assert_eq!(cinemas.len(), 1);
        let movies = &cinemas[0].dates[0].movies;
        assert_eq!(movies[0].title, "Wonder Woman");
        assert_eq!(movies[0].timings.len(), 2);
        assert_eq!(movies[0].timings[1].time, "14:30");
        assert_eq!(movies[1].timings[0].url, "https://www.wecinemas.com.sg/booking.aspx?s=3");
    }

    #[test]
    fn test_every_heading_listed_under_every_date() {
        let html = r#"<table id="DataListCinemas"><tr><td><table>
            <tr><td><h2>WE Cinemas, Clementi</h2></td></tr>
            <tr><td><div class="showtime-date-con"><span class="showtime-date">20 June 2017, Tuesday</span></div></td></tr>
            <tr><td><div class="showtime-date-con"><span class="showtime-date">21 June 2017, Wednesday</span></div></td></tr>
            <tr><td><h3>Cars 3</h3></td></tr>
            <tr><td>PG</td></tr>
            <tr><td>109 mins</td></tr>
            <tr><td><span class="showtimes-but"><a href="b?s=9">1:00PM</a></span></td></tr>
            </table></td></tr></table>"#;
        let cinemas = parse_showtimes(html, WE_CINEMAS_URL).unwrap();
        let dates = &cinemas[0].dates;
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].movies, dates[1].movies);
        assert_eq!(dates[1].date, "2017-06-21");
    }

    #[test]
    fn test_canonical_tree_matches_fixture() {
        let cinemas = parse_showtimes(PAGE, WE_CINEMAS_URL).unwrap();
        let movies = normalize(RawTree::ByCinema(cinemas));

        let actual = serde_json::to_value(&movies).unwrap();
        let expected: serde_json::Value = serde_json::from_str(EXPECTED).unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_fetch_sends_browser_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buy-ticket.aspx"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = WeCinemasScraper::with_listing_url(format!("{}/buy-ticket.aspx", server.uri()));
        let raw = adapter.fetch_raw(&Client::new()).await.unwrap();

        assert_eq!(raw.timing_count(), PAGE.matches("class=\"showtimes-but\"").count());
    }

    #[tokio::test]
    async fn test_fetch_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let adapter = WeCinemasScraper::with_listing_url(format!("{}/buy-ticket.aspx", server.uri()));
        assert!(adapter.fetch_raw(&Client::new()).await.is_err());
    }
}
