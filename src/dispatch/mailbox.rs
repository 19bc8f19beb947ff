//! Correlation table for proxied transforms.
//!
//! Every proxied document request registers a one-shot slot under its own
//! request id. The transform task delivers into that slot; the request
//! waits on it with a timeout. Overlapping requests never see each other's
//! documents.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::archive::DirectoryEntry;
use crate::core::ResolveError;
use crate::log;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// A transformed document waiting to be handed back to its request.
#[derive(Debug, Clone)]
pub struct PendingTransform {
    pub html: String,
    pub dir_entry: DirectoryEntry,
}

type Delivery = Result<PendingTransform, ResolveError>;

#[derive(Default)]
pub struct TransformMailbox {
    slots: Mutex<FxHashMap<RequestId, oneshot::Sender<Delivery>>>,
}

impl TransformMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `id`. The receiver is passed to [`Self::collect`].
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<Delivery> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id, tx);
        rx
    }

    /// Deliver a transform result. Returns `false` when nobody waits for
    /// `id` any more (timed out or never registered).
    pub fn deliver(&self, id: RequestId, result: Delivery) -> bool {
        let Some(tx) = self.slots.lock().remove(&id) else {
            return false;
        };
        tx.send(result).is_ok()
    }

    /// Wait for the delivery of `id`.
    ///
    /// A delivery for a different entry than `expected` is discarded. On
    /// timeout the slot is removed so a late delivery is dropped.
    pub async fn collect(
        &self,
        id: RequestId,
        rx: oneshot::Receiver<Delivery>,
        expected: &DirectoryEntry,
        timeout: Duration,
    ) -> Result<PendingTransform, ResolveError> {
        let delivered = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(ResolveError::TransformTimeout(expected.path()));
            }
            Err(_) => {
                self.slots.lock().remove(&id);
                log!("dispatch"; "{} timed out after {}ms", id, timeout.as_millis());
                return Err(ResolveError::TransformTimeout(expected.path()));
            }
        };

        if delivered.dir_entry.path() != expected.path() {
            log!(
                "dispatch";
                "{} discarded transform for {}, expected {}",
                id,
                delivered.dir_entry.path(),
                expected.path()
            );
            return Err(ResolveError::WrongTransform {
                expected: expected.path(),
                delivered: delivered.dir_entry.path(),
            });
        }
        Ok(delivered)
    }

    /// Requests still waiting for a transform.
    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> DirectoryEntry {
        DirectoryEntry::content(path, "text/html").unwrap()
    }

    fn pending(path: &str) -> PendingTransform {
        PendingTransform {
            html: format!("<p>{path}</p>"),
            dir_entry: entry(path),
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_overlapping_requests_get_their_own_document() {
        let mailbox = TransformMailbox::new();
        let (a, b) = (RequestId(1), RequestId(2));
        let rx_a = mailbox.register(a);
        let rx_b = mailbox.register(b);
        assert_eq!(mailbox.pending(), 2);

        assert!(mailbox.deliver(b, Ok(pending("A/B"))));
        assert!(mailbox.deliver(a, Ok(pending("A/A"))));

        let got_a = mailbox.collect(a, rx_a, &entry("A/A"), WAIT).await.unwrap();
        let got_b = mailbox.collect(b, rx_b, &entry("A/B"), WAIT).await.unwrap();
        assert_eq!(got_a.html, "<p>A/A</p>");
        assert_eq!(got_b.html, "<p>A/B</p>");
        assert_eq!(mailbox.pending(), 0);
    }

    #[tokio::test]
    async fn test_mismatched_entry_is_discarded() {
        let mailbox = TransformMailbox::new();
        let id = RequestId(7);
        let rx = mailbox.register(id);
        mailbox.deliver(id, Ok(pending("A/Other")));

        let err = mailbox.collect(id, rx, &entry("A/Mine"), WAIT).await.unwrap_err();
        assert!(matches!(err, ResolveError::WrongTransform { .. }));
    }

    #[tokio::test]
    async fn test_timeout_removes_slot() {
        let mailbox = TransformMailbox::new();
        let id = RequestId(3);
        let rx = mailbox.register(id);

        let err = mailbox
            .collect(id, rx, &entry("A/Slow"), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::TransformTimeout(_)));
        assert_eq!(mailbox.pending(), 0);
        assert!(!mailbox.deliver(id, Ok(pending("A/Slow"))));
    }

    #[tokio::test]
    async fn test_delivered_error_passes_through() {
        let mailbox = TransformMailbox::new();
        let id = RequestId(4);
        let rx = mailbox.register(id);
        mailbox.deliver(id, Err(ResolveError::NotFound("A/X".into())));

        let err = mailbox.collect(id, rx, &entry("A/X"), WAIT).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_not_a_hang() {
        let mailbox = TransformMailbox::new();
        let id = RequestId(5);
        let rx = mailbox.register(id);
        mailbox.slots.lock().clear();

        let err = mailbox.collect(id, rx, &entry("A/X"), WAIT).await.unwrap_err();
        assert!(matches!(err, ResolveError::TransformTimeout(_)));
    }
}
