//! Scraper for Golden Village.
//! Index: https://www.gv.com.sg/GVCinemas
//!
//! Cinema pages render their timetable from an XHR whose URL contains
//! `session`. Each cinema page is opened just long enough to capture that
//! request, which is then replayed directly to get the JSON timetable.

use std::fmt;
use std::time::Duration;

use futures::future::try_join_all;
use reqwest::{Client, Method};
use scraper::Html;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::normalize::{RawCinemaFilms, RawFilm, RawFilmDate, RawTree, normalize_feed_date, normalize_time};
use crate::session::{CapturedRequest, SharedSessions, with_session};
use crate::{SiteAdapter, Timing, absolute_url, element_text, selector};

pub const GV_CINEMAS_URL: &str = "https://www.gv.com.sg/GVCinemas";

const SEAT_SELECTION_URL: &str = "https://www.gv.com.sg/GVSeatSelection";

/// Substring identifying the timetable request on a cinema page
const SESSION_REQUEST_PATTERN: &str = "session";

/// Feed entries that are not films
const EXCLUDED_TITLES: &[&str] = &["Zen Zone 2017*"];

/// Captured headers the replaying client sets itself
const REPLAY_SKIPPED_HEADERS: &[&str] = &["host", "content-length"];

/// A cinema from the index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GvCinema {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct TimetableResponse {
    #[serde(default)]
    data: Vec<Timetable>,
}

#[derive(Debug, Deserialize)]
pub struct Timetable {
    pub id: Code,
    #[serde(default)]
    pub films: Vec<Film>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Film {
    pub film_title: String,
    pub film_cd: Code,
    #[serde(default)]
    pub dates: Vec<FilmDate>,
}

#[derive(Debug, Deserialize)]
pub struct FilmDate {
    pub date: String,
    #[serde(default)]
    pub times: Vec<Show>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    pub time24: Code,
    pub hall_number: Code,
}

/// Identifier the feed sends either quoted or bare.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Code {
    Text(String),
    Number(i64),
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Text(s) => f.write_str(s.trim()),
            Code::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Golden Village adapter
pub struct GoldenVillageScraper {
    index_url: String,
    sessions: SharedSessions,
    capture_timeout: Duration,
}

impl GoldenVillageScraper {
    pub fn new(sessions: SharedSessions, capture_timeout: Duration) -> Self {
        Self::with_index_url(sessions, capture_timeout, GV_CINEMAS_URL.to_string())
    }

    pub fn with_index_url(sessions: SharedSessions, capture_timeout: Duration, index_url: String) -> Self {
        Self {
            index_url,
            sessions,
            capture_timeout,
        }
    }

    /// Open the index, then capture each cinema's timetable request in turn.
    async fn capture_all(&self) -> Result<Vec<(GvCinema, CapturedRequest)>> {
        let index_url = self.index_url.clone();
        let timeout = self.capture_timeout;
        with_session(self.sessions.as_ref(), move |session| {
            Box::pin(async move {
                session.open(&index_url).await?;
                let html = session.content().await?;
                let cinemas = parse_cinemas(&html, &index_url)?;
                info!("gv: {} cinemas on index", cinemas.len());

                let mut captured = Vec::with_capacity(cinemas.len());
                for cinema in cinemas {
                    let request = session
                        .capture_request(&cinema.url, SESSION_REQUEST_PATTERN, timeout)
                        .await?;
                    debug!("gv: captured {} {} for {}", request.method, request.url, cinema.name);
                    captured.push((cinema, request));
                }
                Ok(captured)
            })
        })
        .await
    }
}

#[async_trait::async_trait]
impl SiteAdapter for GoldenVillageScraper {
    fn name(&self) -> &'static str {
        "gv"
    }

    async fn fetch_raw(&self, client: &Client) -> Result<RawTree> {
        let captured = self.capture_all().await?;
        let cinemas = try_join_all(
            captured
                .into_iter()
                .map(|(cinema, request)| replay(client, cinema, request)),
        )
        .await?;
        info!("gv: replayed {} timetables", cinemas.len());
        Ok(RawTree::ByCinemaFilm(cinemas))
    }
}

/// Cinemas from the plain list and from the brand cards.
pub fn parse_cinemas(html: &str, base: &str) -> Result<Vec<GvCinema>> {
    let doc = Html::parse_document(html);
    let item_sel = selector(".cinemas-list li")?;
    let card_sel = selector(".brand-cinemas-list .col-lg-4")?;
    let link_sel = selector("a")?;
    let logo_sel = selector(".heading img")?;

    let mut cinemas = Vec::new();
    for item in doc.select(&item_sel) {
        let Some(href) = item.select(&link_sel).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        cinemas.push(GvCinema {
            name: element_text(&item),
            url: absolute_url(base, href)?,
        });
    }
    for card in doc.select(&card_sel) {
        let Some(href) = card.select(&link_sel).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        let name = card
            .select(&logo_sel)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .map(|alt| alt.trim().to_string())
            .unwrap_or_default();
        cinemas.push(GvCinema {
            name,
            url: absolute_url(base, href)?,
        });
    }
    Ok(cinemas)
}

/// Reissue a captured timetable request and parse its payload.
async fn replay(client: &Client, cinema: GvCinema, request: CapturedRequest) -> Result<RawCinemaFilms> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|e| Error::Parse(format!("request method {}: {e}", request.method)))?;
    let mut builder = client.request(method, &request.url);
    for (name, value) in &request.headers {
        if REPLAY_SKIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response: TimetableResponse = builder.send().await?.error_for_status()?.json().await?;
    let timetable = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| Error::ElementNotFound(format!("timetable for {}", cinema.name)))?;
    debug!("gv: {} films at {}", timetable.films.len(), cinema.name);

    Ok(RawCinemaFilms {
        name: cinema.name,
        movies: parse_timetable(&timetable),
    })
}

pub fn parse_timetable(timetable: &Timetable) -> Vec<RawFilm> {
    let cinema_id = timetable.id.to_string();
    timetable
        .films
        .iter()
        .filter(|film| !EXCLUDED_TITLES.contains(&film.film_title.as_str()))
        .map(|film| {
            let film_code = film.film_cd.to_string();
            let dates = film
                .dates
                .iter()
                .filter_map(|day| {
                    let Some(date) = normalize_feed_date(&day.date) else {
                        warn!("gv: skipping {} date {:?}", film.film_title, day.date);
                        return None;
                    };
                    let timings = day
                        .times
                        .iter()
                        .map(|show| {
                            let code = show.time24.to_string();
                            Timing {
                                time: normalize_time(&pad_time_code(&code)),
                                url: booking_url(&cinema_id, &film_code, &date, &code, &show.hall_number.to_string()),
                            }
                        })
                        .collect();
                    Some(RawFilmDate { date, timings })
                })
                .collect();
            RawFilm {
                title: film.film_title.trim().to_string(),
                dates,
            }
        })
        .collect()
}

fn booking_url(cinema_id: &str, film_code: &str, date: &str, time24: &str, hall: &str) -> String {
    format!(
        "{SEAT_SELECTION_URL}#/cinemaId/{cinema_id}/filmCode/{film_code}/showDate/{date}/showTime/{time24}/hallNumber/{hall}"
    )
}

/// `930` → `0930`, so early showings parse as `HHMM`.
fn pad_time_code(code: &str) -> String {
    if code.len() < 4 && code.chars().all(|c| c.is_ascii_digit()) {
        format!("{code:0>4}")
    } else {
        code.to_string()
    }
}
