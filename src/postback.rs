//! Dropdown-postback pagination shared by the Shaw and Filmgarde adapters.
//!
//! The listing page holds a date `<select>`; picking a value posts the form
//! back and the server renders that date's showtimes. Dates are visited
//! strictly one at a time on one page, each navigation awaited before the
//! next selection is made.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::normalize::{RawCinema, RawDate};
use crate::session::NavigationSession;

/// Site-specific pieces of a dropdown-postback listing.
pub trait PostbackSite: Send + Sync {
    /// Page holding the date selector
    fn listing_url(&self) -> &str;

    /// Option values of the date selector, in page order
    fn date_values(&self, html: &str) -> Result<Vec<String>>;

    /// Canonical `YYYY-MM-DD` for an option value, `None` if unparseable
    fn date_for(&self, value: &str) -> Option<String>;

    /// Script that selects `value` and triggers the postback
    fn select_script(&self, value: &str) -> String;

    /// Parse one rendered date page
    fn parse_day(&self, html: &str) -> Result<Vec<RawCinema>>;
}

/// Where the driver is in the per-date cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Ready to select the date at `next`
    Idle { next: usize },
    /// Selection for `index` submitted, navigation not yet complete
    AwaitingNavigation { index: usize },
    /// Page for `index` rendered and parsed
    Parsed { index: usize },
    Done,
}

impl PageState {
    /// State after the current one finishes, given how many dates exist.
    pub fn advance(self, total: usize) -> PageState {
        match self {
            PageState::Idle { next } if next >= total => PageState::Done,
            PageState::Idle { next } => PageState::AwaitingNavigation { index: next },
            PageState::AwaitingNavigation { index } => PageState::Parsed { index },
            PageState::Parsed { index } => PageState::Idle { next: index + 1 },
            PageState::Done => PageState::Done,
        }
    }
}

/// Walk every date of a postback listing on one session.
pub async fn paginate<S>(site: &S, session: &mut dyn NavigationSession) -> Result<Vec<RawDate>>
where
    S: PostbackSite + ?Sized,
{
    session.open(site.listing_url()).await?;
    let initial = session.content().await?;

    let mut dates = Vec::new();
    for value in site.date_values(&initial)? {
        match site.date_for(&value) {
            Some(date) => dates.push((value, date)),
            None => warn!("skipping unparseable date option {value:?}"),
        }
    }
    if dates.is_empty() {
        return Err(Error::ElementNotFound(format!(
            "date options on {}",
            site.listing_url()
        )));
    }

    let mut listings = Vec::with_capacity(dates.len());
    let mut state = PageState::Idle { next: 0 };
    loop {
        match state {
            PageState::Idle { next } if next < dates.len() => {
                let (value, _) = &dates[next];
                session.evaluate(&site.select_script(value)).await?;
            }
            PageState::AwaitingNavigation { index } => {
                session.wait_for_navigation().await?;
                let html = session.content().await?;
                let (_, date) = &dates[index];
                let cinemas = site.parse_day(&html)?;
                debug!("{date}: {} cinemas", cinemas.len());
                listings.push(RawDate {
                    date: date.clone(),
                    cinemas,
                });
            }
            PageState::Done => break,
            PageState::Idle { .. } | PageState::Parsed { .. } => {}
        }
        state = state.advance(dates.len());
    }
    Ok(listings)
}
