//! The receive loop: deliveries in, [`ConsumerStatus`] values out.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::core::filter::MessageFilter;
use crate::error::Result;

use super::{ConsumerStatus, Delivery};

/// Per-run settings for [`receive_loop`].
#[derive(Debug, Clone)]
pub struct ReceivePolicy {
    /// Queue depth captured before consuming
    pub total_messages: u64,
    /// Acknowledge every delivery as soon as it arrives
    pub ack_on_receipt: bool,
    /// End the loop once `total_messages` deliveries have been consumed
    pub stop_after_backlog: bool,
}

impl ReceivePolicy {
    fn reached_stop(&self, consumed: u64) -> bool {
        self.stop_after_backlog && self.total_messages > 0 && consumed >= self.total_messages
    }
}

/// Drives `deliveries` through `filter` and emits one status per delivery.
///
/// Filtered-out deliveries are requeued here unless they were acknowledged
/// on receipt; surviving deliveries travel to the receiver, which settles
/// them. The loop ends when the stream ends or fails, when the receiver is
/// dropped, or after the terminal status once the backlog is consumed.
pub async fn receive_loop<S>(
    deliveries: S,
    filter: Arc<MessageFilter>,
    policy: ReceivePolicy,
    status_tx: mpsc::Sender<ConsumerStatus>,
) where
    S: Stream<Item = Result<Delivery>> + Send,
{
    let mut deliveries = std::pin::pin!(deliveries);
    let mut consumed = 0u64;
    let mut filtered = 0u64;

    while let Some(next) = deliveries.next().await {
        let mut delivery = match next {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, "Consumer stream failed");
                break;
            }
        };
        consumed += 1;

        if policy.ack_on_receipt {
            if let Err(e) = delivery.ack().await {
                warn!(error = %e, "Failed to acknowledge delivery");
            }
        }

        let passed = filter.matches(&delivery.body);
        debug!(
            consumed,
            passed,
            routing_key = %delivery.routing_key,
            size = delivery.body.len(),
            "Received delivery"
        );

        let message = if passed {
            Some(delivery)
        } else {
            filtered += 1;
            if let Err(e) = delivery.requeue().await {
                warn!(error = %e, "Failed to requeue filtered delivery");
            }
            None
        };

        let status = ConsumerStatus {
            total_messages: policy.total_messages,
            consumed,
            filtered,
            complete: false,
            delivery: message,
        };
        if status_tx.send(status).await.is_err() {
            debug!("Status receiver dropped, stopping consumer");
            return;
        }

        if policy.reached_stop(consumed) {
            let done = ConsumerStatus::completed(policy.total_messages, consumed, filtered);
            let _ = status_tx.send(done).await;
            debug!(consumed, "Initial backlog consumed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterSettings;
    use crate::consumer::Acknowledge;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counts {
        acks: AtomicUsize,
        nacks: AtomicUsize,
    }

    #[async_trait]
    impl Acknowledge for Counts {
        async fn ack(&self) -> Result<()> {
            self.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn nack_requeue(&self) -> Result<()> {
            self.nacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn deliveries(bodies: &[&str], counts: &Arc<Counts>) -> Vec<Result<Delivery>> {
        bodies
            .iter()
            .map(|body| {
                let acker: Arc<dyn Acknowledge> = counts.clone();
                Ok(Delivery::new("x", "k", body.as_bytes().to_vec(), acker))
            })
            .collect()
    }

    async fn run(
        bodies: &[&str],
        settings: FilterSettings,
        policy: ReceivePolicy,
    ) -> (Vec<ConsumerStatus>, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let stream = futures::stream::iter(deliveries(bodies, &counts));
        let filter = Arc::new(MessageFilter::compile(&settings).unwrap());
        let (tx, mut rx) = mpsc::channel(1);

        let task = tokio::spawn(receive_loop(stream, filter, policy, tx));
        let mut statuses = Vec::new();
        while let Some(status) = rx.recv().await {
            statuses.push(status);
        }
        task.await.unwrap();
        (statuses, counts)
    }

    fn browse(total: u64, stop: bool) -> ReceivePolicy {
        ReceivePolicy {
            total_messages: total,
            ack_on_receipt: false,
            stop_after_backlog: stop,
        }
    }

    #[tokio::test]
    async fn test_one_status_per_delivery_in_order() {
        let (statuses, _) = run(&["a", "b", "c"], FilterSettings::new(), browse(0, false)).await;
        assert_eq!(statuses.len(), 3);
        let consumed: Vec<u64> = statuses.iter().map(|s| s.consumed).collect();
        assert_eq!(consumed, vec![1, 2, 3]);
        assert!(statuses.iter().all(|s| !s.complete && s.delivery.is_some()));
    }

    #[tokio::test]
    async fn test_filtered_deliveries_are_requeued() {
        let (statuses, counts) = run(
            &["keep", "drop", "keep"],
            FilterSettings::new().with_include("keep"),
            browse(0, false),
        )
        .await;
        assert!(statuses[1].delivery.is_none());
        assert_eq!(statuses[2].filtered, 1);
        assert_eq!(counts.nacks.load(Ordering::SeqCst), 1);
        assert_eq!(counts.acks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_ack_acknowledges_everything() {
        let policy = ReceivePolicy {
            ack_on_receipt: true,
            ..browse(0, false)
        };
        let (_, counts) = run(
            &["keep", "drop"],
            FilterSettings::new().with_include("keep"),
            policy,
        )
        .await;
        assert_eq!(counts.acks.load(Ordering::SeqCst), 2);
        assert_eq!(counts.nacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stops_after_backlog() {
        let (statuses, _) = run(&["1", "2", "3", "4", "5"], FilterSettings::new(), browse(3, true)).await;

        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses.iter().filter(|s| !s.complete).count(), 3);
        let last = statuses.last().unwrap();
        assert!(last.complete);
        assert!(last.delivery.is_none());
        assert_eq!(last.consumed, 3);
    }

    #[tokio::test]
    async fn test_no_stop_without_flag() {
        let (statuses, _) = run(&["1", "2", "3"], FilterSettings::new(), browse(2, false)).await;
        assert_eq!(statuses.len(), 3);
        assert!(statuses.iter().all(|s| !s.complete));
    }

    #[tokio::test]
    async fn test_stream_error_ends_loop() {
        let counts = Arc::new(Counts::default());
        let mut items = deliveries(&["a"], &counts);
        items.push(Err(crate::RmqDumpError::config("boom")));
        items.extend(deliveries(&["b"], &counts));

        let filter = Arc::new(MessageFilter::pass_all());
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(receive_loop(
            futures::stream::iter(items),
            filter,
            browse(0, false),
            tx,
        ));

        let mut seen = 0;
        while rx.recv().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 1);
    }
}
