//! Secondary title lookup: a DuckDuckGo "first result" query restricted to
//! IMDb, followed by the listing page's heading.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, header};
use scraper::Html;
use tracing::debug;

use crate::error::{Error, Result};
use crate::resolver::ResolverConfig;
use crate::{USER_AGENT, element_text, fetch_page, selector};

static LISTING_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"tt\d+").expect("listing id pattern"));

pub struct ImdbFallback {
    client: Client,
    search_base: String,
    listing_base: String,
    search_year: i32,
}

impl ImdbFallback {
    pub fn new(client: Client, config: &ResolverConfig) -> Self {
        Self {
            client,
            search_base: config.fallback_search_base.clone(),
            listing_base: config.listing_base.clone(),
            search_year: config.search_year,
        }
    }

    /// Title of the first IMDb listing the search engine returns for `title`.
    pub async fn lookup(&self, title: &str) -> Result<String> {
        let query = format!("!ducky {title} {} site:imdb.com", self.search_year);
        let page = self
            .client
            .get(&self.search_base)
            .header(header::USER_AGENT, USER_AGENT)
            .query(&[("q", query.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let id = LISTING_ID
            .find(&page)
            .ok_or_else(|| Error::FallbackFailed(format!("no listing id for {title:?}")))?
            .as_str();
        let listing_url = format!("{}{id}/", self.listing_base);
        debug!("{title:?} → {listing_url}");

        let listing = fetch_page(&self.client, &listing_url).await?;
        parse_listing_heading(&listing)
            .ok_or_else(|| Error::FallbackFailed(format!("no heading on {listing_url}")))
    }
}

/// Movie name from a listing page, without the year badge nested in the heading.
pub fn parse_listing_heading(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    let legacy = selector(r#"h1[itemprop="name"]"#).ok()?;
    if let Some(h1) = doc.select(&legacy).next() {
        let own_text = h1
            .children()
            .filter_map(|node| node.value().as_text())
            .flat_map(|text| text.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ");
        if !own_text.is_empty() {
            return Some(own_text);
        }
    }

    let hero = selector(r#"h1[data-testid="hero__pageTitle"]"#).ok()?;
    doc.select(&hero)
        .next()
        .map(|h1| element_text(&h1))
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fallback_for(server: &MockServer) -> ImdbFallback {
        let config = ResolverConfig {
            fallback_search_base: format!("{}/html/", server.uri()),
            listing_base: format!("{}/title/", server.uri()),
            search_year: 2017,
            ..ResolverConfig::default()
        };
        ImdbFallback::new(Client::new(), &config)
    }

    #[test]
    fn test_heading_skips_nested_year() {
        let html = r#"<h1 itemprop="name" class="">Baby Driver&nbsp;<span id="titleYear">(<a href="/year/2017/">2017</a>)</span></h1>"#;
        assert_eq!(parse_listing_heading(html).as_deref(), Some("Baby Driver"));
    }

    #[test]
    fn test_heading_from_current_layout() {
        let html = r#"<h1 data-testid="hero__pageTitle"><span class="hero__primary-text">Baby Driver</span></h1>"#;
        assert_eq!(parse_listing_heading(html).as_deref(), Some("Baby Driver"));
    }

    #[test]
    fn test_missing_heading() {
        assert_eq!(parse_listing_heading("<h1>Search</h1>"), None);
    }

    #[tokio::test]
    async fn test_lookup_follows_first_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .and(query_param("q", "!ducky Baby Driver 2017 site:imdb.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="https://www.imdb.com/title/tt3890160/">Baby Driver (2017) - IMDb</a>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/title/tt3890160/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<h1 itemprop="name">Baby Driver <span id="titleYear">(2017)</span></h1>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let title = fallback_for(&server).lookup("Baby Driver").await.unwrap();
        assert_eq!(title, "Baby Driver");
    }

    #[tokio::test]
    async fn test_lookup_without_listing_id_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>No results.</p>"))
            .mount(&server)
            .await;

        let err = fallback_for(&server).lookup("Nothing Here").await.unwrap_err();
        assert!(matches!(err, Error::FallbackFailed(_)));
    }
}
