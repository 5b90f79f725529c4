use crate::models::FeedItem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Tables the feed watches. Notifications carry no payload guarantees
/// beyond "something changed on this table"; watchers always re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedTable {
    Events,
    ContentPosts,
}

#[derive(Debug, Clone, Copy)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy)]
pub struct TableChange {
    pub table: WatchedTable,
    pub op: ChangeOp,
}

/// Process-wide change-notification channel. Mutating routes call `notify`
/// after a successful store write; open feed views subscribe instead of
/// polling. Cloning shares the same channel.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<TableChange>,
    active: Arc<AtomicUsize>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        ChangeHub {
            tx,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn notify(&self, table: WatchedTable, op: ChangeOp) {
        // No live subscribers is a normal state, not an error.
        let _ = self.tx.send(TableChange { table, op });
    }

    pub fn subscribe(&self, tables: &[WatchedTable]) -> Subscription {
        self.active.fetch_add(1, Ordering::SeqCst);
        Subscription {
            rx: self.tx.subscribe(),
            tables: tables.to_vec(),
            active: Arc::clone(&self.active),
        }
    }

    /// Leak check: a view that opened N subscriptions must have closed
    /// exactly N after teardown.
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<TableChange>,
    tables: Vec<WatchedTable>,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    /// Waits for the next change on a watched table. A lagged receiver is
    /// folded into "something changed" since the payload is advisory
    /// anyway. Returns None once the hub is gone.
    pub async fn changed(&mut self) -> Option<TableChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.tables.contains(&change.table) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Change subscription lagged by {} notifications.", skipped);
                    return Some(TableChange {
                        table: self.tables[0],
                        op: ChangeOp::Update,
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared snapshot of the aggregated feed, refreshed on every change
/// notification. Refreshes are fire-and-forget: no cancellation, the
/// later-resolving run wins the write.
#[derive(Clone)]
pub struct LiveFeed {
    snapshot: Arc<RwLock<Vec<FeedItem>>>,
}

fn store(snapshot: &Arc<RwLock<Vec<FeedItem>>>, items: Vec<FeedItem>) {
    let mut guard = snapshot.write().unwrap_or_else(|poisoned| {
        log::error!("Live feed snapshot lock was poisoned; overwriting.");
        poisoned.into_inner()
    });
    *guard = items;
}

impl LiveFeed {
    /// Runs `refresh` once up front and again after every notification on
    /// the subscription; the task ends when the hub is dropped.
    pub fn spawn<F, E>(mut subscription: Subscription, mut refresh: F) -> Self
    where
        F: FnMut() -> Result<Vec<FeedItem>, E> + 'static,
        E: std::fmt::Display + 'static,
    {
        let snapshot: Arc<RwLock<Vec<FeedItem>>> = Arc::new(RwLock::new(Vec::new()));
        let writer = Arc::clone(&snapshot);

        actix_web::rt::spawn(async move {
            match refresh() {
                Ok(items) => store(&writer, items),
                Err(e) => log::error!("Initial live feed refresh failed: {}", e),
            }
            while let Some(change) = subscription.changed().await {
                log::debug!("Re-aggregating feed after change: {:?}", change);
                match refresh() {
                    Ok(items) => store(&writer, items),
                    Err(e) => log::error!("Live feed refresh failed: {}", e),
                }
            }
        });

        LiveFeed { snapshot }
    }

    pub fn snapshot(&self) -> Vec<FeedItem> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| {
                log::error!("Live feed snapshot lock was poisoned; reading stale data.");
                poisoned.into_inner()
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriptions_are_counted_and_released() {
        let hub = ChangeHub::new();
        assert_eq!(hub.active_subscriptions(), 0);
        let a = hub.subscribe(&[WatchedTable::Events]);
        let b = hub.subscribe(&[WatchedTable::Events, WatchedTable::ContentPosts]);
        assert_eq!(hub.active_subscriptions(), 2);
        drop(a);
        assert_eq!(hub.active_subscriptions(), 1);
        drop(b);
        assert_eq!(hub.active_subscriptions(), 0);
    }

    #[actix_web::test]
    async fn notifications_reach_matching_subscribers_only() {
        let hub = ChangeHub::new();
        let mut events_only = hub.subscribe(&[WatchedTable::Events]);

        hub.notify(WatchedTable::ContentPosts, ChangeOp::Insert);
        hub.notify(WatchedTable::Events, ChangeOp::Delete);

        // The post change is skipped, the event change is delivered.
        let change = events_only.changed().await.expect("change");
        assert_eq!(change.table, WatchedTable::Events);
    }

    #[actix_web::test]
    async fn changed_returns_none_when_hub_is_dropped() {
        let hub = ChangeHub::new();
        let mut sub = hub.subscribe(&[WatchedTable::Events]);
        drop(hub);
        assert!(sub.changed().await.is_none());
    }

    #[actix_web::test]
    async fn live_feed_refreshes_on_notification() {
        let hub = ChangeHub::new();
        let sub = hub.subscribe(&[WatchedTable::ContentPosts]);

        let counter = Arc::new(AtomicUsize::new(0));
        let refresh_counter = Arc::clone(&counter);
        let live = LiveFeed::spawn(sub, move || {
            refresh_counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>(Vec::new())
        });

        // Let the initial refresh run, then trigger one more.
        actix_web::rt::time::sleep(std::time::Duration::from_millis(20)).await;
        hub.notify(WatchedTable::ContentPosts, ChangeOp::Insert);
        actix_web::rt::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(counter.load(Ordering::SeqCst) >= 2);
        assert!(live.snapshot().is_empty());
    }
}
