use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::CrawlError;

/// Caps the number of renderer sessions open at the same time.
///
/// Workers acquire an `AdmissionPermit` before opening a session and hold it
/// until the session is closed. Dropping the permit releases the slot, so a
/// failing or panicking worker can never leak one.
#[derive(Clone, Debug)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// A held admission slot
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl AdmissionController {
    /// `max_concurrent` is clamped to at least one slot.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<AdmissionPermit, CrawlError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CrawlError::Aborted(format!("admission closed: {}", e)))?;

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        debug!("Admitted session {}/{}", active, self.max_concurrent);

        Ok(AdmissionPermit {
            _permit: permit,
            active: self.active.clone(),
        })
    }

    #[cfg(test)]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits currently held
    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of permits ever held at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        // Decrement before the semaphore permit itself is returned
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_cap() {
        let admission = AdmissionController::new(3);
        let mut handles = Vec::new();

        for _ in 0..40 {
            let admission = admission.clone();
            handles.push(tokio::spawn(async move {
                let _permit = admission.acquire().await.unwrap();
                assert!(admission.active() <= 3);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(admission.active(), 0);
        assert!(admission.peak() <= 3);
        assert!(admission.peak() >= 1);
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let admission = AdmissionController::new(1);

        let permit = admission.acquire().await.unwrap();
        assert_eq!(admission.active(), 1);

        // Second acquire must wait while the first permit is held
        let waiting = tokio::time::timeout(Duration::from_millis(20), admission.acquire()).await;
        assert!(waiting.is_err());

        drop(permit);
        let again = tokio::time::timeout(Duration::from_millis(20), admission.acquire()).await;
        assert!(again.is_ok());
    }

    #[test]
    fn test_zero_is_clamped_to_one() {
        let admission = AdmissionController::new(0);
        assert_eq!(admission.max_concurrent(), 1);
    }
}
