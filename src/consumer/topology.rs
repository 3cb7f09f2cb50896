//! Queue declaration and bindings.

use lapin::Channel;
use lapin::options::{QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::error::{Result, RmqDumpError};

/// Where deliveries come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QueueSource {
    /// An existing queue, inspected for its backlog ("dump")
    Named(String),
    /// A broker-named, exclusive, auto-delete queue ("monitor")
    Temporary,
}

/// The declarations and bindings to perform, derived from [`QueueConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TopologyPlan {
    pub source: QueueSource,
    pub exchange: String,
    pub binding_keys: Vec<String>,
}

/// The result of applying a [`TopologyPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Topology {
    pub queue_name: String,
    /// Backlog at start; always 0 for temporary queues
    pub total_messages: u64,
}

impl TopologyPlan {
    pub fn from_config(config: &QueueConfig) -> Self {
        let keys = config.trimmed_routing_keys();

        match config.queue.as_deref().filter(|q| !q.is_empty()) {
            Some(queue) => {
                // Binding to the default exchange is not allowed.
                let binding_keys = if config.exchange.is_empty() {
                    Vec::new()
                } else if keys.is_empty() {
                    vec![String::new()]
                } else {
                    keys
                };
                Self {
                    source: QueueSource::Named(queue.to_string()),
                    exchange: config.exchange.clone(),
                    binding_keys,
                }
            }
            None => Self {
                source: QueueSource::Temporary,
                exchange: config.exchange.clone(),
                binding_keys: keys,
            },
        }
    }

    pub async fn apply(&self, channel: &Channel) -> Result<Topology> {
        let topology = match &self.source {
            QueueSource::Named(name) => {
                let options = QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                };
                let queue = channel
                    .queue_declare(name, options, FieldTable::default())
                    .await
                    .map_err(|e| RmqDumpError::connection(format!("inspect queue '{}'", name), e))?;
                info!(queue = %name, messages = queue.message_count(), "Connected to queue");
                Topology {
                    queue_name: name.clone(),
                    total_messages: u64::from(queue.message_count()),
                }
            }
            QueueSource::Temporary => {
                let options = QueueDeclareOptions {
                    durable: false,
                    auto_delete: true,
                    exclusive: true,
                    ..QueueDeclareOptions::default()
                };
                let queue = channel
                    .queue_declare("", options, FieldTable::default())
                    .await
                    .map_err(|e| RmqDumpError::connection("declare temporary queue", e))?;
                info!(queue = queue.name().as_str(), "Declared temporary queue");
                if self.binding_keys.is_empty() {
                    warn!(exchange = %self.exchange, "No routing keys given, the temporary queue receives nothing");
                }
                Topology {
                    queue_name: queue.name().as_str().to_string(),
                    total_messages: 0,
                }
            }
        };

        for key in &self.binding_keys {
            channel
                .queue_bind(
                    &topology.queue_name,
                    &self.exchange,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    RmqDumpError::connection(
                        format!("bind queue to exchange '{}' with key '{}'", self.exchange, key),
                        e,
                    )
                })?;
            info!(exchange = %self.exchange, routing_key = %key, "Bound queue");
        }

        Ok(topology)
    }
}
