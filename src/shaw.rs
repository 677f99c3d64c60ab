//! Scraper for Shaw Theatres (mobile site).
//! Listing: http://m.shaw.sg/
//! The date `<select id="ddlShowDate">` posts the whole form back, so every
//! date is a separate server render driven through a browser session.

use reqwest::Client;
use scraper::Html;
use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::normalize::{RawCinema, RawMovie, RawTree, normalize_date, normalize_time};
use crate::postback::{self, PostbackSite};
use crate::session::{SharedSessions, script_call, with_session};
use crate::{SiteAdapter, Timing, absolute_url, element_text, selector};

pub const SHAW_URL: &str = "http://m.shaw.sg/";

/// Option values look like `6/20/2017`.
const OPTION_DATE_FORMAT: &str = "%m/%d/%Y";

const SELECT_DATE_SCRIPT: &str = "function(date) {
    document.querySelector('#globalform').ddlShowDate.value = date;
    document.querySelector('[type=\"submit\"]').click();
    return true;
}";

#[derive(Debug, Clone)]
struct ShawSite {
    listing_url: String,
}

impl PostbackSite for ShawSite {
    fn listing_url(&self) -> &str {
        &self.listing_url
    }

    fn date_values(&self, html: &str) -> Result<Vec<String>> {
        parse_date_options(html)
    }

    fn date_for(&self, value: &str) -> Option<String> {
        normalize_date(value, OPTION_DATE_FORMAT)
    }

    fn select_script(&self, value: &str) -> String {
        script_call(SELECT_DATE_SCRIPT, &[json!(value)])
    }

    fn parse_day(&self, html: &str) -> Result<Vec<RawCinema>> {
        parse_day(html, &self.listing_url)
    }
}

/// Shaw Theatres adapter
pub struct ShawScraper {
    site: ShawSite,
    sessions: SharedSessions,
}

impl ShawScraper {
    pub fn new(sessions: SharedSessions) -> Self {
        Self::with_listing_url(sessions, SHAW_URL.to_string())
    }

    pub fn with_listing_url(sessions: SharedSessions, listing_url: String) -> Self {
        Self {
            site: ShawSite { listing_url },
            sessions,
        }
    }
}

#[async_trait::async_trait]
impl SiteAdapter for ShawScraper {
    fn name(&self) -> &'static str {
        "shaw"
    }

    async fn fetch_raw(&self, _client: &Client) -> Result<RawTree> {
        info!("shaw: paginating {}", self.site.listing_url);
        let site = self.site.clone();
        let dates = with_session(self.sessions.as_ref(), move |session| {
            Box::pin(async move { postback::paginate(&site, session).await })
        })
        .await?;
        info!("shaw: {} dates", dates.len());
        Ok(RawTree::ByDate(dates))
    }
}

/// Values of `#ddlShowDate` options, in page order.
pub fn parse_date_options(html: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let option_sel = selector("#ddlShowDate option")?;
    Ok(doc
        .select(&option_sel)
        .filter_map(|o| o.value().attr("value"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

/// One `.persist-area` per cinema, each holding `.filminfo` blocks.
pub fn parse_day(html: &str, base: &str) -> Result<Vec<RawCinema>> {
    let doc = Html::parse_document(html);
    let area_sel = selector(".persist-area")?;
    let name_sel = selector(".floatingHeader .category.cplex.header")?;
    let film_sel = selector(".filminfo")?;
    let title_sel = selector(".filmtitle")?;
    let time_sel = selector(".filmshowtime a")?;

    let mut cinemas = Vec::new();
    for area in doc.select(&area_sel) {
        let name = area
            .select(&name_sel)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();

        let mut movies = Vec::new();
        for film in area.select(&film_sel) {
            let title = film
                .select(&title_sel)
                .next()
                .map(|el| element_text(&el))
                .unwrap_or_default();
            if title.is_empty() {
                continue;
            }
            let mut timings = Vec::new();
            for a in film.select(&time_sel) {
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
        cinemas.push(RawCinema { name, movies });
    }
    Ok(cinemas)
}
