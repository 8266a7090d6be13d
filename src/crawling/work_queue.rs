//! Bounded work queue between the catalog walker and the review workers
//!
//! One producer, N consumers. Consumers share the receiver behind an async
//! mutex; the producer blocks when the queue is full.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::domain::ReviewVariant;
use crate::infrastructure::config::drom;

/// One model listing to crawl, starting at `page`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub brand_slug: String,
    pub model_slug: String,
    pub variant: ReviewVariant,
    pub page: u32,
}

impl WorkItem {
    pub fn new(brand_slug: impl Into<String>, model_slug: impl Into<String>, variant: ReviewVariant) -> Self {
        Self {
            brand_slug: brand_slug.into(),
            model_slug: model_slug.into(),
            variant,
            page: 1,
        }
    }

    pub fn page_url(&self, base_url: &str, page: u32) -> String {
        match self.variant {
            ReviewVariant::Long => drom::long_reviews_page_url(base_url, &self.brand_slug, &self.model_slug, page),
            ReviewVariant::Short => drom::short_reviews_page_url(base_url, &self.brand_slug, &self.model_slug, page),
        }
    }

    pub fn model_key(&self) -> String {
        format!("{}/{}", self.brand_slug, self.model_slug)
    }
}

pub struct WorkSender {
    sender: mpsc::Sender<WorkItem>,
}

impl WorkSender {
    /// Enqueue an item, waiting for capacity. Returns `false` when the
    /// run was cancelled or every consumer is gone.
    pub async fn send(&self, item: WorkItem, cancel: &CancellationToken) -> bool {
        tokio::select! {
            sent = self.sender.send(item) => sent.is_ok(),
            () = cancel.cancelled() => false,
        }
    }
}

#[derive(Clone)]
pub struct WorkReceiver {
    receiver: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
}

impl WorkReceiver {
    /// Next item, or `None` once the producer is done and the queue is
    /// drained, or the run was cancelled
    pub async fn next(&self, cancel: &CancellationToken) -> Option<WorkItem> {
        if cancel.is_cancelled() {
            return None;
        }
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            item = receiver.recv() => item,
            () = cancel.cancelled() => None,
        }
    }
}

/// Bounded queue; capacity is clamped to at least one slot
pub fn work_queue(capacity: usize) -> (WorkSender, WorkReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        WorkSender { sender },
        WorkReceiver {
            receiver: Arc::new(Mutex::new(receiver)),
        },
    )
}
