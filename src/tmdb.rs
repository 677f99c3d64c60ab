//! Client for The Movie Database search and detail endpoints.
//!
//! A 429 answer is retried after a fixed delay, indefinitely unless the
//! resolver config caps the number of retries.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Error, Result};
use crate::resolver::ResolverConfig;

/// `/search/movie` response
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: u64,
    #[serde(default)]
    pub title: String,
}

/// `/movie/{id}` response, reduced to what the showtime records carry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MovieDetails {
    #[serde(default)]
    pub genres: Vec<Named>,
    #[serde(default)]
    pub production_countries: Vec<Named>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Named {
    pub name: String,
}

impl MovieDetails {
    pub fn genre(&self) -> Option<String> {
        self.genres.first().map(|g| g.name.clone())
    }

    /// Average vote to one decimal; absent until someone has voted.
    pub fn rating(&self) -> Option<String> {
        (self.vote_count > 0).then(|| format!("{:.1}", self.vote_average))
    }

    pub fn country(&self) -> Option<String> {
        self.production_countries.first().map(|c| c.name.clone())
    }
}

pub struct TmdbClient {
    client: Client,
    api_base: String,
    api_key: String,
    rate_limit_delay: Duration,
    max_rate_limit_retries: Option<u32>,
}

impl TmdbClient {
    pub fn new(client: Client, config: &ResolverConfig) -> Self {
        Self {
            client,
            api_base: config.tmdb_api_base.trim_end_matches('/').to_string(),
            api_key: config.tmdb_api_key.clone(),
            rate_limit_delay: config.rate_limit_delay,
            max_rate_limit_retries: config.max_rate_limit_retries,
        }
    }

    /// Search movies by title.
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let url = format!("{}/search/movie", self.api_base);
        self.get_json(&url, &[("query", query)]).await
    }

    /// Fetch one movie's detail record.
    pub async fn movie(&self, id: u64) -> Result<MovieDetails> {
        let url = format!("{}/movie/{id}", self.api_base);
        self.get_json(&url, &[]).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T> {
        let mut retries = 0u32;
        loop {
            let response = self
                .client
                .get(url)
                .query(&[("api_key", self.api_key.as_str())])
                .query(params)
                .send()
                .await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if let Some(max) = self.max_rate_limit_retries
                    && retries >= max
                {
                    return Err(Error::RateLimited);
                }
                retries += 1;
                debug!("rate limited on {url}, retry {retries} in {:?}", self.rate_limit_delay);
                sleep(self.rate_limit_delay).await;
                continue;
            }

            return Ok(response.error_for_status()?.json().await?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, max_retries: Option<u32>) -> TmdbClient {
        let config = ResolverConfig {
            tmdb_api_base: server.uri(),
            tmdb_api_key: "test-key".to_string(),
            rate_limit_delay: Duration::from_millis(10),
            max_rate_limit_retries: max_retries,
            ..ResolverConfig::default()
        };
        TmdbClient::new(Client::new(), &config)
    }

    #[tokio::test]
    async fn test_search_sends_key_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("query", "Finding Dory"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": 1,
                "total_results": 1,
                "results": [{"id": 127380, "title": "Finding Dory"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = client_for(&server, None).search("Finding Dory").await.unwrap();
        assert_eq!(results.total_results, 1);
        assert_eq!(results.results[0].id, 127380);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_after_delay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_results": 0,
                "results": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = client_for(&server, None).search("Cars 3").await.unwrap();
        assert_eq!(results.total_results, 0);
    }

    #[tokio::test]
    async fn test_rate_limit_cap_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server, Some(2)).search("Cars 3").await.unwrap_err();
        assert!(matches!(err, Error::RateLimited));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, None).movie(1).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[tokio::test]
    async fn test_movie_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie/127380"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 127380,
                "genres": [{"id": 16, "name": "Animation"}, {"id": 10751, "name": "Family"}],
                "production_countries": [{"iso_3166_1": "US", "name": "United States of America"}],
                "vote_average": 6.96,
                "vote_count": 4100
            })))
            .mount(&server)
            .await;

        let details = client_for(&server, None).movie(127380).await.unwrap();
        assert_eq!(details.genre().as_deref(), Some("Animation"));
        assert_eq!(details.rating().as_deref(), Some("7.0"));
        assert_eq!(details.country().as_deref(), Some("United States of America"));
    }

    #[test]
    fn test_unvoted_movie_has_no_rating() {
        let details = MovieDetails {
            vote_average: 0.0,
            vote_count: 0,
            ..MovieDetails::default()
        };
        assert_eq!(details.rating(), None);
        assert_eq!(details.genre(), None);
    }
}
