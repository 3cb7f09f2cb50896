//! Inbound deliveries and their acknowledgment handles.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::types::FieldTable;

use crate::core::models::Envelope;
use crate::error::{Result, RmqDumpError};

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Acknowledges the delivery, removing it from the queue.
    async fn ack(&self) -> Result<()>;

    /// Rejects the delivery and puts it back on the queue.
    async fn nack_requeue(&self) -> Result<()>;
}

#[async_trait]
impl Acknowledge for Acker {
    async fn ack(&self) -> Result<()> {
        Acker::ack(self, BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(RmqDumpError::Acknowledge)
    }

    async fn nack_requeue(&self) -> Result<()> {
        let options = BasicNackOptions {
            requeue: true,
            ..BasicNackOptions::default()
        };
        Acker::nack(self, options)
            .await
            .map(|_| ())
            .map_err(RmqDumpError::Acknowledge)
    }
}

/// One message received from the broker.
///
/// A delivery is settled at most once: after [`ack`](Self::ack) or
/// [`requeue`](Self::requeue) succeeds, further calls are no-ops.
pub struct Delivery {
    /// AMQP headers, if the publisher set any
    pub headers: Option<FieldTable>,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    acker: Arc<dyn Acknowledge>,
    settled: bool,
}

impl Delivery {
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: impl Into<Vec<u8>>,
        acker: Arc<dyn Acknowledge>,
    ) -> Self {
        Self {
            headers: None,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            body: body.into(),
            acker,
            settled: false,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Acknowledges the delivery.
    pub async fn ack(&mut self) -> Result<()> {
        if !self.settled {
            self.acker.ack().await?;
            self.settled = true;
        }
        Ok(())
    }

    /// Puts the delivery back on the queue, unless it was already settled.
    pub async fn requeue(&mut self) -> Result<()> {
        if !self.settled {
            self.acker.nack_requeue().await?;
            self.settled = true;
        }
        Ok(())
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Projects the delivery into its export form.
    pub fn to_envelope(&self) -> Envelope {
        Envelope::from_parts(
            self.headers.as_ref(),
            &self.exchange,
            &self.routing_key,
            &self.body,
        )
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        let headers = delivery.properties.headers().clone();
        Self {
            headers,
            exchange: delivery.exchange.as_str().to_string(),
            routing_key: delivery.routing_key.as_str().to_string(),
            body: delivery.data,
            acker: Arc::new(delivery.acker),
            settled: false,
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}
