//! Message processing: consumer statuses in, exported envelopes out.
//!
//! [`MessageProcessor`] reads [`ConsumerStatus`] values, hands surviving
//! deliveries to an [`Exporter`], settles them, keeps the counters and
//! reports progress. [`run`] wires the whole pipeline together.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DumpConfig;
use crate::consumer::{Consumer, ConsumerStatus};
use crate::core::output::{Exporter, create_exporter};
use crate::error::{Result, RmqDumpError};
use crate::progress::{Progress, ProgressCallback, no_progress};

/// Counters for one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    /// Deliveries received from the broker
    pub consumed: u64,
    /// Deliveries rejected by the filter
    pub filtered: u64,
    /// Envelopes written successfully
    pub exported: u64,
    /// Envelopes the exporter failed to write
    pub failed_writes: u64,
    /// The terminal status arrived, or there was no backlog to read
    pub drained: bool,
}

impl ProcessingStats {
    /// Share of consumed messages that were exported (0.0 - 100.0).
    pub fn export_ratio(&self) -> f64 {
        if self.consumed == 0 {
            return 0.0;
        }
        (self.exported as f64 / self.consumed as f64) * 100.0
    }
}

/// Bridges consumer statuses to an exporter.
pub struct MessageProcessor {
    exporter: Box<dyn Exporter>,
    progress: ProgressCallback,
    stop_after_backlog: bool,
}

impl MessageProcessor {
    pub fn new(exporter: Box<dyn Exporter>) -> Self {
        Self {
            exporter,
            progress: no_progress(),
            stop_after_backlog: false,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Enables the empty-queue fast path of [`process`](Self::process).
    #[must_use]
    pub fn with_stop_after_backlog(mut self, stop: bool) -> Self {
        self.stop_after_backlog = stop;
        self
    }

    /// Processes statuses until the terminal status or the end of the stream.
    ///
    /// With the stop flag set and an empty backlog (`total_messages == 0`)
    /// this returns immediately without reading anything. Write failures are
    /// logged and counted; they never end the run.
    pub async fn process(
        &mut self,
        total_messages: u64,
        statuses: &mut mpsc::Receiver<ConsumerStatus>,
    ) -> ProcessingStats {
        let mut stats = ProcessingStats::default();

        if self.stop_after_backlog && total_messages == 0 {
            info!("Queue is empty, nothing to dump");
            stats.drained = true;
            return stats;
        }

        let total = (total_messages > 0).then_some(total_messages);

        while let Some(status) = statuses.recv().await {
            stats.consumed = status.consumed;
            stats.filtered = status.filtered;

            if let Some(mut delivery) = status.delivery {
                // Blocking write; the receive loop waits on the bounded channel meanwhile.
                match self.exporter.write_envelope(&delivery.to_envelope()) {
                    Ok(()) => stats.exported += 1,
                    Err(e) => {
                        stats.failed_writes += 1;
                        warn!(error = %e, routing_key = %delivery.routing_key, "Failed to write message");
                    }
                }
                if let Err(e) = delivery.requeue().await {
                    warn!(error = %e, "Failed to requeue delivery");
                }

                (self.progress)(
                    Progress::new(status.consumed, total)
                        .with_exported(stats.exported)
                        .with_filtered(stats.filtered),
                );
            }

            if status.complete {
                stats.drained = true;
                (self.progress)(
                    Progress::new(status.consumed, total)
                        .with_exported(stats.exported)
                        .with_filtered(stats.filtered),
                );
                info!(
                    consumed = stats.consumed,
                    exported = stats.exported,
                    filtered = stats.filtered,
                    "Message processing complete"
                );
                break;
            }
        }

        debug!(?stats, "Status stream finished");
        stats
    }

    /// Closes the exporter.
    ///
    /// # Errors
    ///
    /// Returns the exporter's flush or close error.
    pub fn close(&mut self) -> Result<()> {
        self.exporter.close()
    }
}

/// Runs one dump or monitor invocation end to end.
///
/// Connects the consumer (compiling filters first), opens the exporter,
/// processes statuses, then closes the exporter and the connection whether
/// or not processing succeeded.
///
/// # Errors
///
/// Returns construction errors (configuration, filters, connection, output
/// file) and the exporter's close error. Per-message failures only show up
/// in the returned [`ProcessingStats`].
pub async fn run(config: &DumpConfig, progress: ProgressCallback) -> Result<ProcessingStats> {
    config.validate()?;
    if let Ok(described) = config.describe() {
        info!("Configuration used:\n{}", described);
    }

    let mut consumer = Consumer::connect(config).await?;

    let exporter = match create_exporter(&config.output) {
        Ok(exporter) => exporter,
        Err(e) => {
            let _ = consumer.close().await;
            return Err(e);
        }
    };
    let mut processor = MessageProcessor::new(exporter)
        .with_progress(progress)
        .with_stop_after_backlog(consumer.stops_after_backlog());

    let outcome = match consumer.consume().await {
        Ok(mut statuses) => {
            if consumer.stops_after_backlog() {
                info!("Stopping after consuming all messages");
            }
            info!("Waiting for messages. To exit press CTRL+C");
            Ok(processor
                .process(consumer.total_messages(), &mut statuses)
                .await)
        }
        Err(e) => Err(e),
    };

    let closed = processor.close();
    let consumer_closed = consumer.close().await;

    let stats = outcome?;
    closed?;
    match consumer_closed {
        Err(e) if e.is_consumer() => return Err(e),
        Err(e) => warn!(error = %e, "Failed to close broker connection"),
        Ok(()) => {}
    }
    ensure_drained(&stats, consumer.stops_after_backlog())?;
    Ok(stats)
}

/// Fails a stop-after-consume run whose status stream ended early.
fn ensure_drained(stats: &ProcessingStats, stop_after_backlog: bool) -> Result<()> {
    if stop_after_backlog && !stats.drained {
        return Err(RmqDumpError::consumer(format!(
            "consumer stopped before the backlog was drained ({} consumed)",
            stats.consumed
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_ratio() {
        let stats = ProcessingStats {
            consumed: 4,
            exported: 3,
            filtered: 1,
            failed_writes: 0,
            drained: true,
        };
        assert_eq!(stats.export_ratio(), 75.0);
        assert_eq!(ProcessingStats::default().export_ratio(), 0.0);
    }

    #[test]
    fn test_undrained_backlog_is_an_error() {
        let partial = ProcessingStats {
            consumed: 1,
            exported: 1,
            ..ProcessingStats::default()
        };
        let err = ensure_drained(&partial, true).unwrap_err();
        assert!(err.is_consumer());
        assert!(err.to_string().contains("before the backlog was drained"));

        assert!(ensure_drained(&partial, false).is_ok());
        let drained = ProcessingStats {
            drained: true,
            ..partial
        };
        assert!(ensure_drained(&drained, true).is_ok());
    }
}
