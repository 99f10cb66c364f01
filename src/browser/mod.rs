pub mod session;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::CrawlError;

// Re-export common types
pub use session::WebDriverFactory;

/// One isolated renderer session (a browser tab or process).
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url` and wait for the document to be ready
    async fn navigate(&self, url: &str) -> Result<(), CrawlError>;

    /// Block until `selector` matches a visible element or `timeout` expires
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), CrawlError>;

    /// Run `script` in the page and return its JSON result
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, CrawlError>;

    /// Attribute value of the first match, empty if the attribute is absent
    async fn read_attribute(&self, selector: &str, name: &str) -> Result<String, CrawlError>;

    async fn read_inner_html(&self, selector: &str) -> Result<String, CrawlError>;

    /// Release the session. Safe to call more than once.
    async fn close(&self) -> Result<(), CrawlError>;
}

/// Opens renderer sessions
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Renderer>, CrawlError>;
}

/// Run `fut` with a hard upper bound, mapping expiry to `CrawlError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, CrawlError>
where
    F: Future<Output = Result<T, CrawlError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CrawlError::Timeout {
            what: what.to_string(),
            timeout: limit,
        }),
    }
}

/// Extra time granted on top of a visibility wait before it is cut off from
/// the outside, so the renderer's own timeout normally fires first
const WAIT_GRACE: Duration = Duration::from_secs(2);

/// `Renderer::wait_visible` with an outer bound that also covers a renderer
/// which stops responding altogether
pub async fn wait_visible(
    renderer: &dyn Renderer,
    selector: &str,
    timeout: Duration,
) -> Result<(), CrawlError> {
    bounded(timeout + WAIT_GRACE, selector, renderer.wait_visible(selector, timeout)).await
}

/// Open a session from `factory` within `limit`.
///
/// The open keeps running if the limit expires, since the remote end may
/// already have created the session. A late session is closed in the
/// background and `guard` is held until that close finishes. On success the
/// guard is handed back with the session.
pub async fn open_within<G>(
    factory: Arc<dyn RendererFactory>,
    limit: Duration,
    guard: G,
) -> Result<(Box<dyn Renderer>, G), CrawlError>
where
    G: Send + 'static,
{
    let mut opening = tokio::spawn(async move { factory.open().await });

    match tokio::time::timeout(limit, &mut opening).await {
        Ok(Ok(result)) => result.map(|session| (session, guard)),
        Ok(Err(e)) => Err(CrawlError::Aborted(format!("session open task: {}", e))),
        Err(_) => {
            tokio::spawn(async move {
                if let Ok(Ok(session)) = opening.await {
                    if let Err(e) = session.close().await {
                        warn!("Failed to close late session: {}", e);
                    }
                }
                drop(guard);
            });

            Err(CrawlError::Timeout {
                what: "renderer session".to_string(),
                timeout: limit,
            })
        }
    }
}

/// Close `session` within `limit`.
///
/// A close that overruns the limit is left to finish in the background and
/// `guard` is released only once it has.
pub async fn close_within<G>(
    session: Box<dyn Renderer>,
    limit: Duration,
    guard: G,
) -> Result<(), CrawlError>
where
    G: Send + 'static,
{
    let mut closing = tokio::spawn(async move { session.close().await });

    match tokio::time::timeout(limit, &mut closing).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(CrawlError::Aborted(format!("session close task: {}", e))),
        Err(_) => {
            tokio::spawn(async move {
                if let Ok(Err(e)) = closing.await {
                    warn!("Background session close failed: {}", e);
                }
                drop(guard);
            });

            Err(CrawlError::Timeout {
                what: "session close".to_string(),
                timeout: limit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_maps_expiry_to_timeout() {
        let result: Result<(), CrawlError> = bounded(Duration::from_secs(5), "navigation", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        match result {
            Err(CrawlError::Timeout { what, timeout }) => {
                assert_eq!(what, "navigation");
                assert_eq!(timeout, Duration::from_secs(5));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bounded_passes_through_results() {
        let value = bounded(Duration::from_secs(1), "read", async { Ok(7) }).await;
        tokio_test::assert_ok!(value);

        let err: Result<(), CrawlError> = bounded(Duration::from_secs(1), "read", async {
            Err(CrawlError::Renderer("boom".to_string()))
        })
        .await;
        tokio_test::assert_err!(err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_within_holds_guard_until_close_finishes() {
        use crate::crawler::testing::FakeSite;

        let site = FakeSite::new().with_close_delay(Duration::from_secs(60));
        let session = site.factory().open().await.unwrap();
        let guard = Arc::new(());

        let err = close_within(session, Duration::from_secs(5), guard.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Timeout { .. }));
        assert_eq!(Arc::strong_count(&guard), 2);
        assert_eq!(site.open_sessions(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(Arc::strong_count(&guard), 1);
        assert_eq!(site.open_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_within_closes_late_session() {
        use crate::crawler::testing::FakeSite;

        let site = FakeSite::new().with_open_delay(Duration::from_secs(40));
        let guard = Arc::new(());

        let result = open_within(site.factory(), Duration::from_secs(30), guard.clone()).await;
        assert!(matches!(result, Err(CrawlError::Timeout { .. })));
        assert_eq!(Arc::strong_count(&guard), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(site.sessions_opened(), 1);
        assert_eq!(site.open_sessions(), 0);
        assert_eq!(Arc::strong_count(&guard), 1);
    }
}
