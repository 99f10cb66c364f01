use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thirtyfour::prelude::*;
use tracing::{debug, error};

use crate::browser::{Renderer, RendererFactory};
use crate::cli::config::BrowserSettings;
use crate::error::CrawlError;

/// How often visibility waits re-check the DOM
const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn renderer_error(err: WebDriverError) -> CrawlError {
    CrawlError::Renderer(err.to_string())
}

/// Opens one WebDriver session per renderer
pub struct WebDriverFactory {
    /// Browser settings
    config: BrowserSettings,

    /// Page load timeout applied to every new session
    page_load_timeout: Duration,
}

impl WebDriverFactory {
    pub fn new(config: BrowserSettings, page_load_timeout: Duration) -> Self {
        Self {
            config,
            page_load_timeout,
        }
    }
}

#[async_trait]
impl RendererFactory for WebDriverFactory {
    async fn open(&self) -> Result<Box<dyn Renderer>, CrawlError> {
        let session_error = |err: WebDriverError| CrawlError::Session(err.to_string());

        let mut caps = DesiredCapabilities::chrome();

        caps.add_chrome_arg(&format!(
            "--window-size={},{}",
            self.config.viewport.width, self.config.viewport.height
        ))
        .map_err(session_error)?;

        if self.config.headless {
            caps.set_headless().map_err(session_error)?;
        }

        caps.add_chrome_arg("--disable-dev-shm-usage")
            .map_err(session_error)?;

        let driver = WebDriver::new(&self.config.webdriver_url, caps)
            .await
            .map_err(session_error)?;

        if let Err(e) = driver.set_page_load_timeout(self.page_load_timeout).await {
            let _ = driver.quit().await;
            return Err(session_error(e));
        }

        debug!("Browser session opened on {}", self.config.webdriver_url);

        Ok(Box::new(BrowserSession::new(driver)))
    }
}

/// A renderer backed by a single WebDriver session
pub struct BrowserSession {
    /// WebDriver instance
    driver: WebDriver,

    closed: AtomicBool,
}

impl BrowserSession {
    pub fn new(driver: WebDriver) -> Self {
        Self {
            driver,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Renderer for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        debug!("Navigating to: {}", url);
        self.driver
            .goto(url)
            .await
            .map_err(|e| CrawlError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), CrawlError> {
        self.driver
            .query(By::Css(selector))
            .wait(timeout, POLL_INTERVAL)
            .and_displayed()
            .first()
            .await
            .map(|_| ())
            .map_err(|e| {
                debug!("Wait for {} ended with: {}", selector, e);
                CrawlError::Timeout {
                    what: selector.to_string(),
                    timeout,
                }
            })
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, CrawlError> {
        let result = self
            .driver
            .execute(script, Vec::new())
            .await
            .map_err(renderer_error)?;

        Ok(result.json().clone())
    }

    async fn read_attribute(&self, selector: &str, name: &str) -> Result<String, CrawlError> {
        let element = self
            .driver
            .find(By::Css(selector))
            .await
            .map_err(renderer_error)?;

        let value = element.attr(name).await.map_err(renderer_error)?;
        Ok(value.unwrap_or_default())
    }

    async fn read_inner_html(&self, selector: &str) -> Result<String, CrawlError> {
        let element = self
            .driver
            .find(By::Css(selector))
            .await
            .map_err(renderer_error)?;

        element.inner_html().await.map_err(renderer_error)
    }

    async fn close(&self) -> Result<(), CrawlError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Marked closed only once quit succeeds, so Drop still quits otherwise
        self.driver.clone().quit().await.map_err(renderer_error)?;
        self.closed.store(true, Ordering::SeqCst);
        debug!("Browser session closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Spawn a task to quit the driver
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let driver = self.driver.clone();
            handle.spawn(async move {
                if let Err(e) = driver.quit().await {
                    error!("Error closing browser session during drop: {}", e);
                }
            });
        }
    }
}
