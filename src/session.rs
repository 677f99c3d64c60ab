//! Remote page automation used by the browser-driven adapters.
//!
//! A [`NavigationSession`] is one live rendering context. Sessions are only
//! handed out through [`with_session`], which closes them on every exit path
//! so no browser process outlives its adapter run.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::fetch::{
    self, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::cdp::browser_protocol::page::{
    EventLoadEventFired, NavigateParams, StopLoadingParams,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// An outgoing request observed in a page and aborted before completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// One live remote page.
#[async_trait::async_trait]
pub trait NavigationSession: Send {
    /// Load `url`; resolves once the initial load completes
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Fully rendered markup at the current navigation state
    async fn content(&mut self) -> Result<String>;

    /// Run `script` in the page and return its JSON result
    async fn evaluate(&mut self, script: &str) -> Result<Value>;

    /// Resolves the next time the page signals a completed load
    async fn wait_for_navigation(&mut self) -> Result<()>;

    /// Navigate to `url` and capture the first outgoing request whose URL
    /// contains `pattern`, aborting it instead of letting it complete.
    async fn capture_request(
        &mut self,
        url: &str,
        pattern: &str,
        timeout: Duration,
    ) -> Result<CapturedRequest>;

    /// Release the rendering context
    async fn close(&mut self) -> Result<()>;
}

/// Launches fresh sessions.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn NavigationSession>>;
}

/// Run `body` against a freshly launched session and close it afterwards,
/// whether `body` succeeded or not.
pub async fn with_session<T, F>(factory: &dyn SessionFactory, body: F) -> Result<T>
where
    T: Send,
    F: for<'s> FnOnce(&'s mut (dyn NavigationSession + 'static)) -> BoxFuture<'s, Result<T>>
        + Send,
{
    let mut session = factory.launch().await?;
    let outcome = body(session.as_mut()).await;
    let closed = session.close().await;
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(value), Err(close_err)) => {
            warn!("session close failed after success: {close_err}");
            Ok(value)
        }
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!("session close failed after error: {close_err}");
            Err(err)
        }
    }
}

/// Build an immediately-invoked script: `(function(a, b) {..}).apply(null, [..])`.
pub fn script_call(function: &str, args: &[Value]) -> String {
    format!("({function}).apply(null, {})", Value::Array(args.to_vec()))
}

/// Browser launch settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Explicit Chromium executable; auto-detected when `None`
    pub chrome_executable: Option<std::path::PathBuf>,
    /// Upper bound on a single navigation wait
    pub navigation_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

/// Headless Chromium session factory.
pub struct ChromeSessionFactory {
    config: SessionConfig,
}

impl ChromeSessionFactory {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn launch(&self) -> Result<Box<dyn NavigationSession>> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--blink-settings=imagesEnabled=false")
            .request_timeout(self.config.navigation_timeout);
        if let Some(path) = &self.config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(Error::Browser)?;

        let (mut browser, mut handler) = Browser::launch(browser_config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler event error: {e}");
                }
            }
        });

        let opened = async {
            let page = browser.new_page("about:blank").await?;
            let loads = page.event_listener::<EventLoadEventFired>().await?;
            Ok::<_, Error>((page, loads))
        }
        .await;
        let (page, loads) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!("browser close failed after launch error: {close_err}");
                }
                handler_task.abort();
                return Err(e);
            }
        };
        debug!("browser session launched");

        Ok(Box::new(ChromeSession {
            browser,
            page,
            loads,
            handler_task,
            navigation_timeout: self.config.navigation_timeout,
        }))
    }
}

/// A Chromium tab driven over CDP.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    loads: EventStream<EventLoadEventFired>,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromeSession {
    /// Forget load events that already fired so the next wait sees a new one.
    fn drain_loads(&mut self) {
        while let Some(Some(_)) = self.loads.next().now_or_never() {}
    }

    async fn intercept_first(&mut self, url: &str, pattern: &str) -> Result<CapturedRequest> {
        let mut paused = self.page.event_listener::<EventRequestPaused>().await?;
        let intercept = RequestPattern::builder()
            .url_pattern(format!("*{pattern}*"))
            .request_stage(RequestStage::Request)
            .build();
        self.page
            .execute(fetch::EnableParams::builder().pattern(intercept).build())
            .await?;
        self.page.execute(NavigateParams::new(url)).await?;

        while let Some(event) = paused.next().await {
            if !event.request.url.contains(pattern) {
                continue;
            }
            let headers = event
                .request
                .headers
                .inner()
                .as_object()
                .map(|map| {
                    map.iter()
                        .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                        .collect()
                })
                .unwrap_or_default();
            let captured = CapturedRequest {
                method: event.request.method.clone(),
                url: event.request.url.clone(),
                headers,
                body: event.request.post_data.clone(),
            };
            self.page
                .execute(FailRequestParams::new(event.request_id.clone(), ErrorReason::Aborted))
                .await?;
            self.page.execute(StopLoadingParams::default()).await?;
            return Ok(captured);
        }
        Err(Error::Browser(format!("page closed before a request matched {pattern}")))
    }
}

#[async_trait::async_trait]
impl NavigationSession for ChromeSession {
    async fn open(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        self.drain_loads();
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn wait_for_navigation(&mut self) -> Result<()> {
        match tokio::time::timeout(self.navigation_timeout, self.loads.next()).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(Error::Browser("page closed while awaiting navigation".to_string())),
            Err(_) => Err(Error::Browser(format!(
                "no page load within {:?}",
                self.navigation_timeout
            ))),
        }
    }

    async fn capture_request(
        &mut self,
        url: &str,
        pattern: &str,
        timeout: Duration,
    ) -> Result<CapturedRequest> {
        let outcome = tokio::time::timeout(timeout, self.intercept_first(url, pattern)).await;
        if let Err(e) = self.page.execute(fetch::DisableParams::default()).await {
            debug!("disabling request interception failed: {e}");
        }
        self.drain_loads();
        match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::CaptureTimeout(url.to_string())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        self.handler_task.abort();
        closed?;
        debug!("browser session closed");
        Ok(())
    }
}

/// Shared handle type the adapters hold
pub type SharedSessions = Arc<dyn SessionFactory>;
