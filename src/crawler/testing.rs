//! In-memory renderer and writer doubles shared by the crawler tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser::{Renderer, RendererFactory};
use crate::crawler::task::OutputArtifact;
use crate::error::CrawlError;
use crate::storage::ArtifactWriter;

/// How a fake page behaves when rendered
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub links: Vec<String>,
    pub container_class: String,
    pub html: String,
    pub has_heading: bool,
    pub unreachable: bool,
    pub never_ready: bool,
    /// Time spent loading the page
    pub load_time: Duration,
}

impl FakePage {
    pub fn seed(links: &[&str]) -> Self {
        Self {
            links: links.iter().map(|link| link.to_string()).collect(),
            container_class: "content-wrapper".to_string(),
            has_heading: true,
            ..Default::default()
        }
    }

    pub fn article(html: &str) -> Self {
        Self {
            container_class: "content-wrapper".to_string(),
            html: html.to_string(),
            has_heading: true,
            ..Default::default()
        }
    }

    pub fn error_page() -> Self {
        Self {
            container_class: "content-wrapper doc-error".to_string(),
            html: "<p>Something went wrong</p>".to_string(),
            ..Default::default()
        }
    }

    pub fn never_ready() -> Self {
        Self {
            never_ready: true,
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn without_heading(mut self) -> Self {
        self.has_heading = false;
        self
    }

    pub fn with_load_time(mut self, load_time: Duration) -> Self {
        self.load_time = load_time;
        self
    }
}

#[derive(Default)]
struct SiteState {
    pages: Mutex<HashMap<String, FakePage>>,
    navigations: Mutex<HashMap<String, usize>>,
    open: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    open_delay: Mutex<Duration>,
    close_delay: Mutex<Duration>,
}

/// A scripted website plus session accounting
#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<SiteState>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, page: FakePage) -> Self {
        self.state
            .pages
            .lock()
            .unwrap()
            .insert(url.to_string(), page);
        self
    }

    /// Time every session takes to start
    pub fn with_open_delay(self, delay: Duration) -> Self {
        *self.state.open_delay.lock().unwrap() = delay;
        self
    }

    /// Time every session takes to shut down
    pub fn with_close_delay(self, delay: Duration) -> Self {
        *self.state.close_delay.lock().unwrap() = delay;
        self
    }

    pub fn factory(&self) -> Arc<dyn RendererFactory> {
        Arc::new(FakeFactory {
            state: self.state.clone(),
        })
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn peak_sessions(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn navigations(&self, url: &str) -> usize {
        self.state
            .navigations
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

struct FakeFactory {
    state: Arc<SiteState>,
}

#[async_trait]
impl RendererFactory for FakeFactory {
    async fn open(&self) -> Result<Box<dyn Renderer>, CrawlError> {
        let delay = *self.state.open_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let open = self.state.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(open, Ordering::SeqCst);
        self.state.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeRenderer {
            state: self.state.clone(),
            current: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeRenderer {
    state: Arc<SiteState>,
    current: Mutex<Option<FakePage>>,
    closed: AtomicBool,
}

impl FakeRenderer {
    fn page(&self) -> Result<FakePage, CrawlError> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CrawlError::Renderer("no page loaded".to_string()))
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        *self
            .state
            .navigations
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        let page = self.state.pages.lock().unwrap().get(url).cloned();
        let page = page.ok_or_else(|| CrawlError::Navigation {
            url: url.to_string(),
            reason: "404".to_string(),
        })?;

        if !page.load_time.is_zero() {
            tokio::time::sleep(page.load_time).await;
        }

        if page.unreachable {
            return Err(CrawlError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }

        *self.current.lock().unwrap() = Some(page);
        Ok(())
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), CrawlError> {
        let page = self.page()?;

        if page.never_ready {
            std::future::pending::<()>().await;
        }

        if selector.contains("h1") && !page.has_heading {
            return Err(CrawlError::Timeout {
                what: selector.to_string(),
                timeout,
            });
        }

        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, CrawlError> {
        Ok(serde_json::json!(self.page()?.links))
    }

    async fn read_attribute(&self, _selector: &str, name: &str) -> Result<String, CrawlError> {
        let page = self.page()?;
        Ok(if name == "class" {
            page.container_class
        } else {
            String::new()
        })
    }

    async fn read_inner_html(&self, _selector: &str) -> Result<String, CrawlError> {
        Ok(self.page()?.html)
    }

    async fn close(&self) -> Result<(), CrawlError> {
        let delay = *self.state.close_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Writer that keeps artifacts in memory
#[derive(Clone, Default)]
pub struct MemoryWriter {
    files: Arc<Mutex<BTreeMap<PathBuf, String>>>,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes to `path` fail with a permission error
    pub fn fail_on(self, path: &str) -> Self {
        self.failing.lock().unwrap().insert(PathBuf::from(path));
        self
    }

    pub fn files(&self) -> BTreeMap<PathBuf, String> {
        self.files.lock().unwrap().clone()
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(&PathBuf::from(path)).cloned()
    }
}

#[async_trait]
impl ArtifactWriter for MemoryWriter {
    async fn write(&self, artifact: &OutputArtifact) -> Result<PathBuf, CrawlError> {
        if self.failing.lock().unwrap().contains(&artifact.path) {
            return Err(CrawlError::Write {
                path: artifact.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }

        self.files
            .lock()
            .unwrap()
            .insert(artifact.path.clone(), artifact.body.clone());
        Ok(artifact.path.clone())
    }
}
