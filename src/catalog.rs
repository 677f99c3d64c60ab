//! Cinema labels and the id-keyed catalog artifact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ShowtimeRecord;

/// Raw site labels → `Chain - Location`
const CINEMA_LABELS: &[(&str, &str)] = &[
    ("AMK HUB", "Cathay - AMK Hub"),
    ("Bugis+", "Filmgarde - Bugis+"),
    ("CAUSEWAY POINT", "Cathay - Causeway Point"),
    ("CINELEISURE ORCHARD", "Cathay - Cineleisure Orchard"),
    ("DOWNTOWN EAST", "Cathay - Downtown East"),
    ("GV Bishan", "GV - Bishan"),
    ("GV City Square", "GV - City Square"),
    ("GV Grand, Great World City", "GV - Gemini Grand, Great World City"),
    ("GV Jurong Point", "GV - Jurong Point"),
    ("GV Katong", "GV - Katong"),
    ("GV Plaza", "GV - Plaza"),
    ("GV Suntec City", "GV - Suntec City"),
    ("GV Tampines", "GV - Tampines"),
    ("GV Tiong Bahru", "GV - Tiong Bahru"),
    ("GV VivoCity", "GV - VivoCity"),
    ("GV Yishun", "GV - Yishun"),
    ("JEM", "Cathay - Jem"),
    ("Leisure Park Kallang", "Filmgarde - Leisure Park Kallang"),
    ("Shaw Theatres Balestier", "Shaw - Theatres Balestier"),
    ("Shaw Theatres Century", "Shaw - Theatres Century"),
    ("Shaw Theatres JCube", "Shaw - Theatres JCube"),
    ("Shaw Theatres Lido", "Shaw - Theatres Lido"),
    ("Shaw Theatres Lot One", "Shaw - Theatres Lot One"),
    ("Shaw Theatres Seletar", "Shaw - Theatres Seletar"),
    ("Shaw Theatres Waterway Point", "Shaw - Theatres Waterway Point"),
    ("Shaw Theatres nex", "Shaw - Theatres nex"),
    ("THE CATHAY", "Cathay - The Cathay"),
    ("WE Cinemas, Clementi", "WE - Cinemas"),
    ("WEST MALL", "Cathay - West Mall"),
];

/// Display label for a cinema; unknown labels pass through.
pub fn format_cinema(raw: &str) -> String {
    CINEMA_LABELS
        .iter()
        .find(|(label, _)| *label == raw)
        .map(|(_, formatted)| formatted.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Lowercase ASCII alphanumerics joined by single hyphens.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCinema {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMovie {
    pub title: String,
    pub genre: Option<String>,
    pub rating: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogShowtime {
    pub cinema: String,
    pub movie: String,
    pub date: String,
    pub time: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub cinemas: BTreeMap<String, CatalogCinema>,
    pub movies: BTreeMap<String, CatalogMovie>,
    pub showtimes: Vec<CatalogShowtime>,
}

/// Split flat records into cinema and movie tables referenced by slug.
pub fn build_catalog(records: &[ShowtimeRecord]) -> Catalog {
    let mut catalog = Catalog::default();
    for record in records {
        let cinema_id = slugify(&record.cinema);
        let movie_id = slugify(&record.movie);
        catalog
            .cinemas
            .entry(cinema_id.clone())
            .or_insert_with(|| CatalogCinema {
                name: record.cinema.clone(),
            });
        catalog
            .movies
            .entry(movie_id.clone())
            .or_insert_with(|| CatalogMovie {
                title: record.movie.clone(),
                genre: record.genre.clone(),
                rating: record.rating.clone(),
                country: record.country.clone(),
            });
        catalog.showtimes.push(CatalogShowtime {
            cinema: cinema_id,
            movie: movie_id,
            date: record.date.clone(),
            time: record.time.clone(),
            url: record.url.clone(),
        });
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cinema: &str, movie: &str, time: &str) -> ShowtimeRecord {
        ShowtimeRecord {
            cinema: cinema.to_string(),
            movie: movie.to_string(),
            date: "2017-06-20".to_string(),
            time: time.to_string(),
            url: format!("https://example.com/{time}"),
            genre: Some("Animation".to_string()),
            rating: Some("7.0".to_string()),
            country: None,
        }
    }

    #[test]
    fn test_format_known_labels() {
        assert_eq!(format_cinema("GV Bishan"), "GV - Bishan");
        assert_eq!(format_cinema("AMK HUB"), "Cathay - AMK Hub");
        assert_eq!(format_cinema("WE Cinemas, Clementi"), "WE - Cinemas");
        assert_eq!(CINEMA_LABELS.len(), 29);
    }

    #[test]
    fn test_format_unknown_label_passes_through() {
        assert_eq!(format_cinema("GV Funan"), "GV Funan");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("GV - Gemini Grand, Great World City"), "gv-gemini-grand-great-world-city");
        assert_eq!(slugify("Filmgarde - Bugis+"), "filmgarde-bugis");
        assert_eq!(slugify("Spider-Man: Homecoming"), "spider-man-homecoming");
    }

    #[test]
    fn test_catalog_dedupes_and_keeps_showtime_order() {
        let records = vec![
            record("GV - Bishan", "Cars 3", "11:00"),
            record("Shaw - Theatres Lido", "Cars 3", "12:00"),
            record("GV - Bishan", "Wonder Woman", "13:00"),
        ];
        let catalog = build_catalog(&records);

        assert_eq!(catalog.cinemas.len(), 2);
        assert_eq!(catalog.movies.len(), 2);
        assert_eq!(catalog.movies["cars-3"].genre.as_deref(), Some("Animation"));
        let times: Vec<_> = catalog.showtimes.iter().map(|s| s.time.as_str()).collect();
        assert_eq!(times, ["11:00", "12:00", "13:00"]);
        assert_eq!(catalog.showtimes[1].cinema, "shaw-theatres-lido");
    }
}
