//! Raw per-site trees and their folding into [`CanonicalMovie`]s.
//!
//! Every adapter reports listings in its site's own nesting order. Folding is
//! keyed on the exact raw title string (case-sensitive, no punctuation or
//! whitespace unification) and keeps titles, dates and cinemas in the order
//! they were discovered.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::{CanonicalMovie, CinemaTimings, MovieDate, Timing};

/// Canonical calendar-day format
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical local clock format
pub const TIME_FORMAT: &str = "%H:%M";

/// A year-less date further than this in the past belongs to next year.
const YEAR_ROLLOVER_DAYS: i64 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMovie {
    pub title: String,
    pub timings: Vec<Timing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawCinema {
    pub name: String,
    pub movies: Vec<RawMovie>,
}

/// One date page of a postback site: date → cinema → movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawDate {
    pub date: String,
    pub cinemas: Vec<RawCinema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawDateMovies {
    pub date: String,
    pub movies: Vec<RawMovie>,
}

/// Cinema → date → movie, as static tabbed and tabled pages list them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawCinemaDates {
    pub name: String,
    pub dates: Vec<RawDateMovies>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawFilmDate {
    pub date: String,
    pub timings: Vec<Timing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawFilm {
    pub title: String,
    pub dates: Vec<RawFilmDate>,
}

/// Cinema → movie → date, as replayed timetable payloads are shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawCinemaFilms {
    pub name: String,
    pub movies: Vec<RawFilm>,
}

/// What an adapter returns before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "nesting", content = "entries", rename_all = "snake_case")]
pub enum RawTree {
    ByDate(Vec<RawDate>),
    ByCinema(Vec<RawCinemaDates>),
    ByCinemaFilm(Vec<RawCinemaFilms>),
}

impl RawTree {
    /// Number of timings anywhere in the tree
    pub fn timing_count(&self) -> usize {
        match self {
            RawTree::ByDate(dates) => dates
                .iter()
                .flat_map(|d| &d.cinemas)
                .flat_map(|c| &c.movies)
                .map(|m| m.timings.len())
                .sum(),
            RawTree::ByCinema(cinemas) => cinemas
                .iter()
                .flat_map(|c| &c.dates)
                .flat_map(|d| &d.movies)
                .map(|m| m.timings.len())
                .sum(),
            RawTree::ByCinemaFilm(cinemas) => cinemas
                .iter()
                .flat_map(|c| &c.movies)
                .flat_map(|m| &m.dates)
                .map(|d| d.timings.len())
                .sum(),
        }
    }
}

/// Fold a raw tree into one entry per distinct raw title.
pub fn normalize(tree: RawTree) -> Vec<CanonicalMovie> {
    let mut grouper = TitleGrouper::default();
    match tree {
        RawTree::ByDate(dates) => {
            for day in dates {
                for cinema in day.cinemas {
                    for movie in cinema.movies {
                        grouper.push(movie.title, &day.date, &cinema.name, movie.timings);
                    }
                }
            }
        }
        RawTree::ByCinema(cinemas) => {
            for cinema in cinemas {
                for day in cinema.dates {
                    for movie in day.movies {
                        grouper.push(movie.title, &day.date, &cinema.name, movie.timings);
                    }
                }
            }
        }
        RawTree::ByCinemaFilm(cinemas) => {
            for cinema in cinemas {
                for film in cinema.movies {
                    for day in film.dates {
                        grouper.push(film.title.clone(), &day.date, &cinema.name, day.timings);
                    }
                }
            }
        }
    }
    grouper.movies
}

#[derive(Default)]
struct TitleGrouper {
    movies: Vec<CanonicalMovie>,
    index: HashMap<String, usize>,
}

impl TitleGrouper {
    fn push(&mut self, title: String, date: &str, cinema: &str, timings: Vec<Timing>) {
        let slot = match self.index.get(&title) {
            Some(&i) => i,
            None => {
                self.index.insert(title.clone(), self.movies.len());
                self.movies.push(CanonicalMovie {
                    raw_title: title,
                    dates: Vec::new(),
                });
                self.movies.len() - 1
            }
        };
        let movie = &mut self.movies[slot];
        let day = match movie.dates.iter().position(|d| d.date == date) {
            Some(i) => i,
            None => {
                movie.dates.push(MovieDate {
                    date: date.to_string(),
                    cinemas: Vec::new(),
                });
                movie.dates.len() - 1
            }
        };
        movie.dates[day].cinemas.push(CinemaTimings {
            name: cinema.to_string(),
            timings,
        });
    }
}

/// Parse `raw` with `format` and render it as `YYYY-MM-DD`.
pub fn normalize_date(raw: &str, format: &str) -> Option<String> {
    NaiveDate::parse_from_str(raw.trim(), format)
        .ok()
        .map(|d| d.format(DATE_FORMAT).to_string())
}

/// Parse a year-less day/month (`format` without `%Y`) against `reference`.
///
/// The reference year is assumed unless that puts the date more than half a
/// year in the past, in which case the listing is for next year.
pub fn normalize_yearless_date(raw: &str, format: &str, reference: NaiveDate) -> Option<String> {
    let with_year = format!("{} {}", raw.trim(), reference.year());
    let full_format = format!("{format} %Y");
    let mut date = NaiveDate::parse_from_str(&with_year, &full_format).ok()?;
    if reference - date > Duration::days(YEAR_ROLLOVER_DAYS) {
        date = date.with_year(reference.year() + 1)?;
    }
    Some(date.format(DATE_FORMAT).to_string())
}

/// Parse the assorted date strings timetable payloads carry.
pub fn normalize_feed_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive().format(DATE_FORMAT).to_string());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date().format(DATE_FORMAT).to_string());
        }
    }
    ["%Y-%m-%d", "%d-%m-%Y", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"]
        .iter()
        .find_map(|format| normalize_date(raw, format))
}

/// Render a clock string as `HH:MM`.
///
/// Accepts `1:30PM`, `1:30 pm`, `13:30` and the 24-hour `1330` codes; any
/// other text is returned trimmed and unchanged.
pub fn normalize_time(raw: &str) -> String {
    let trimmed = raw.trim();
    let compact = trimmed.replace(' ', "").to_uppercase();
    for format in ["%I:%M%p", "%I.%M%p", "%H:%M", "%H.%M", "%H%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(&compact, format) {
            return time.format(TIME_FORMAT).to_string();
        }
    }
    trimmed.to_string()
}
