//! Background delivery of notifications, off the request path.

use super::{Notification, Notifier};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Notifications queued before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 1024;

enum Envelope {
    Deliver(Notification),
    Flush(oneshot::Sender<()>),
}

/// Queues notifications for a worker task that hands them to a [`Notifier`].
///
/// `send` never waits on delivery. The worker delivers in queue order and logs
/// failures.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Envelope>,
}

impl Dispatcher {
    /// Start the delivery worker on the current tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run(notifier, rx));
        Self { tx }
    }

    /// Queue `notification`. Dropped with a warning when the queue is full.
    pub fn send(&self, notification: Notification) {
        match self.tx.try_send(Envelope::Deliver(notification)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(Envelope::Deliver(n))) => {
                warn!(member_id = %n.member_id(), "Notification queue full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(Envelope::Deliver(n))) => {
                warn!(member_id = %n.member_id(), "Notification worker stopped, dropping");
            }
            Err(_) => {}
        }
    }

    /// Wait until everything queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, waiter) = oneshot::channel();
        if self.tx.send(Envelope::Flush(done)).await.is_ok() {
            let _ = waiter.await;
        }
    }
}

async fn run(notifier: Arc<dyn Notifier>, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Deliver(notification) => {
                if let Err(e) = notifier.notify(&notification).await {
                    warn!(
                        member_id = %notification.member_id(),
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Notification queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MemberId;
    use crate::notify::MockNotifier;
    use std::time::{Duration, Instant};

    fn kyc(member: i64) -> Notification {
        Notification::KycReviewed {
            member_id: MemberId::new(member),
            approved: true,
        }
    }

    #[tokio::test]
    async fn test_send_does_not_wait_for_slow_delivery() {
        let notifier = MockNotifier::new()
            .delayed(Duration::from_millis(300))
            .failing();
        let dispatcher = Dispatcher::spawn(Arc::new(notifier.clone()));

        let started = Instant::now();
        dispatcher.send(kyc(1));
        dispatcher.send(kyc(2));
        assert!(started.elapsed() < Duration::from_millis(100));

        dispatcher.flush().await;
        assert_eq!(notifier.sent(), vec![kyc(1), kyc(2)]);
    }

    #[tokio::test]
    async fn test_flush_on_empty_queue_returns() {
        let notifier = MockNotifier::new();
        let dispatcher = Dispatcher::spawn(Arc::new(notifier.clone()));
        dispatcher.flush().await;
        assert!(notifier.sent().is_empty());
    }
}
