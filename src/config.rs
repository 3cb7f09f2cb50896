//! Resolved configuration for a dump or monitor invocation.
//!
//! The pipeline never reads flags, environment variables or files on its own.
//! Everything it needs is collected into a [`DumpConfig`] at the boundary
//! (see [`crate::cli`]) and passed in by reference.
//!
//! # Sections
//!
//! - [`ConnectionConfig`] - broker URL and TLS verification
//! - [`QueueConfig`] - queue name, exchange, routing keys, ack/stop policy
//! - [`OutputConfig`] - writer kind, output path, file mode, pretty printing
//! - [`FilterSettings`] - include/exclude patterns, regex, jq query, size limit
//!
//! # Example
//!
//! ```rust
//! use rmqdump::config::{DumpConfig, WriterKind};
//!
//! # fn main() -> rmqdump::Result<()> {
//! let config = DumpConfig::builder()
//!     .url("amqp://localhost:5672/%2f")
//!     .queue("orders")
//!     .writer(WriterKind::Console)
//!     .stop_after_consume(true)
//!     .include_pattern("order_id")
//!     .build()?;
//!
//! assert!(config.queue.is_named());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RmqDumpError};

/// Sentinel for [`FilterSettings::max_message_size`] meaning "no limit".
pub const UNLIMITED_MESSAGE_SIZE: i64 = -1;

/// Default broker address used when no URL is given.
pub const DEFAULT_URL: &str = "localhost:5672";

/// Default RabbitMQ virtual host.
pub const DEFAULT_VIRTUAL_HOST: &str = "/";

/// Which sink receives exported envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterKind {
    /// Standard output
    Console,
    /// A file on disk
    #[default]
    File,
}

impl WriterKind {
    /// Returns all accepted writer names.
    pub fn all_names() -> &'static [&'static str] {
        &["console", "file"]
    }
}

impl fmt::Display for WriterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterKind::Console => f.write_str("console"),
            WriterKind::File => f.write_str("file"),
        }
    }
}

impl FromStr for WriterKind {
    type Err = RmqDumpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(WriterKind::Console),
            "file" => Ok(WriterKind::File),
            other => Err(RmqDumpError::config(format!(
                "invalid writer type '{}', must be one of: {}",
                other,
                WriterKind::all_names().join(", ")
            ))),
        }
    }
}

/// How the file writer opens its output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    /// Keep existing content and add new lines at the end
    Append,
    /// Truncate the file when it is opened
    #[default]
    Overwrite,
}

impl FileMode {
    /// Returns all accepted file mode names.
    pub fn all_names() -> &'static [&'static str] {
        &["append", "overwrite"]
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileMode::Append => f.write_str("append"),
            FileMode::Overwrite => f.write_str("overwrite"),
        }
    }
}

impl FromStr for FileMode {
    type Err = RmqDumpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(FileMode::Append),
            "overwrite" => Ok(FileMode::Overwrite),
            other => Err(RmqDumpError::config(format!(
                "invalid file mode '{}' (use 'append' or 'overwrite')",
                other
            ))),
        }
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Full AMQP URL, including scheme and virtual host
    pub url: String,

    /// Accept any server certificate on `amqps://` connections (insecure)
    pub skip_tls_verification: bool,
}

impl ConnectionConfig {
    /// Returns `true` when the URL asks for a TLS connection.
    pub fn is_secure(&self) -> bool {
        self.url.starts_with("amqps://")
    }

    /// Returns the URL with any password replaced by `****`.
    pub fn masked_url(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                let _ = parsed.set_password(Some("****"));
                parsed.to_string()
            }
            _ => self.url.clone(),
        }
    }
}

/// Queue topology and consumption policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Existing queue to drain; `None` declares a temporary queue instead
    pub queue: Option<String>,

    /// Exchange the queue is bound to
    pub exchange: String,

    /// Routing keys for the bindings
    pub routing_keys: Vec<String>,

    /// Acknowledge every delivery on receipt (removes it from the queue)
    pub auto_ack: bool,

    /// Stop once the queue's initial backlog has been consumed
    pub stop_after_consume: bool,
}

impl QueueConfig {
    /// Returns `true` in named-queue ("dump") mode.
    pub fn is_named(&self) -> bool {
        self.queue.as_deref().is_some_and(|q| !q.is_empty())
    }

    /// Returns `true` when deliveries are acknowledged on receipt.
    ///
    /// Temporary queues are always auto-acknowledged: they are exclusive to
    /// this connection and disappear with it.
    pub fn acks_on_receipt(&self) -> bool {
        self.auto_ack || !self.is_named()
    }

    /// Returns `true` when consumption ends after the initial backlog.
    ///
    /// Only meaningful for named queues; a temporary queue has no backlog.
    pub fn stops_after_backlog(&self) -> bool {
        self.stop_after_consume && self.is_named()
    }

    /// Routing keys with surrounding whitespace removed.
    pub fn trimmed_routing_keys(&self) -> Vec<String> {
        self.routing_keys
            .iter()
            .map(|key| key.trim().to_string())
            .collect()
    }
}

/// Output sink settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Console or file
    pub writer: WriterKind,

    /// Output path, required for the file writer
    pub output_file: Option<PathBuf>,

    /// Truncate or append when opening the output file
    pub file_mode: FileMode,

    /// Pretty-print each envelope
    pub pretty_print: bool,
}

/// Raw (uncompiled) filter settings.
///
/// Compilation happens in [`MessageFilter::new`](crate::core::filter::MessageFilter::new).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// A message must match at least one of these (when non-empty)
    pub include_patterns: Vec<String>,

    /// A message matching any of these is rejected
    pub exclude_patterns: Vec<String>,

    /// jq-style query evaluated against the parsed body
    pub json_filter: Option<String>,

    /// Single regex the body must match
    pub regex_filter: Option<String>,

    /// Maximum body size in bytes, [`UNLIMITED_MESSAGE_SIZE`] for no limit
    pub max_message_size: i64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            json_filter: None,
            regex_filter: None,
            max_message_size: UNLIMITED_MESSAGE_SIZE,
        }
    }
}

impl FilterSettings {
    /// Creates settings with no active filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an include pattern.
    #[must_use]
    pub fn with_include(mut self, pattern: impl Into<String>) -> Self {
        self.include_patterns.push(pattern.into());
        self
    }

    /// Adds an exclude pattern.
    #[must_use]
    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Sets the jq-style query.
    #[must_use]
    pub fn with_json_filter(mut self, query: impl Into<String>) -> Self {
        self.json_filter = Some(query.into());
        self
    }

    /// Sets the single regex filter.
    #[must_use]
    pub fn with_regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex_filter = Some(pattern.into());
        self
    }

    /// Sets the maximum body size in bytes.
    #[must_use]
    pub fn with_max_message_size(mut self, size: i64) -> Self {
        self.max_message_size = size;
        self
    }

    /// Returns `true` if any filter is active.
    pub fn is_active(&self) -> bool {
        !self.include_patterns.is_empty()
            || !self.exclude_patterns.is_empty()
            || self.json_filter.is_some()
            || self.regex_filter.is_some()
            || self.max_message_size >= 0
    }

    fn validate(&self) -> Result<()> {
        if self.include_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(RmqDumpError::config("include patterns cannot be empty"));
        }
        if self.exclude_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(RmqDumpError::config("exclude patterns cannot be empty"));
        }
        if self.max_message_size != UNLIMITED_MESSAGE_SIZE && self.max_message_size <= 0 {
            return Err(RmqDumpError::config(
                "max message size must be -1 or a positive integer",
            ));
        }
        Ok(())
    }
}

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    pub connection: ConnectionConfig,
    pub queue: QueueConfig,
    pub output: OutputConfig,
    pub filter: FilterSettings,
}

impl DumpConfig {
    /// Starts building a configuration.
    pub fn builder() -> DumpConfigBuilder {
        DumpConfigBuilder::default()
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.connection.url.trim().is_empty() {
            return Err(RmqDumpError::config("RabbitMQ URL is required"));
        }
        Url::parse(&self.connection.url).map_err(|e| {
            RmqDumpError::config(format!("invalid RabbitMQ URL '{}': {}", self.connection.url, e))
        })?;
        if !self.connection.url.starts_with("amqp://") && !self.connection.is_secure() {
            return Err(RmqDumpError::config(format!(
                "unsupported URL scheme in '{}' (expected amqp:// or amqps://)",
                self.connection.url
            )));
        }

        if !self.queue.is_named() && self.queue.exchange.is_empty() {
            return Err(RmqDumpError::config(
                "an exchange is required to monitor through a temporary queue",
            ));
        }

        if self.output.writer == WriterKind::File && self.output.output_file.is_none() {
            return Err(RmqDumpError::config(
                "output file is required when using file writer",
            ));
        }

        self.filter.validate()
    }

    /// Renders the effective configuration as pretty JSON, password masked.
    pub fn describe(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.connection.url = self.connection.masked_url();
        Ok(serde_json::to_string_pretty(&shown)?)
    }
}

/// Builds the full AMQP URL from its parts.
///
/// A `host[:port]` address is combined with the scheme and virtual host; an
/// address that already carries an `amqp://` or `amqps://` scheme is returned
/// unchanged. The default virtual host `/` is encoded as `%2f`.
///
/// # Example
///
/// ```rust
/// use rmqdump::config::compose_url;
///
/// assert_eq!(compose_url("localhost:5672", "/", false), "amqp://localhost:5672/%2f");
/// assert_eq!(compose_url("mq:5671", "prod", true), "amqps://mq:5671/prod");
/// ```
pub fn compose_url(address: &str, virtual_host: &str, secure: bool) -> String {
    let address = address.trim();
    if address.starts_with("amqp://") || address.starts_with("amqps://") {
        return address.to_string();
    }
    let scheme = if secure { "amqps" } else { "amqp" };
    let vhost = match virtual_host.trim() {
        "" | "/" => "%2f".to_string(),
        other => other.replace('/', "%2f"),
    };
    format!("{}://{}/{}", scheme, address.trim_end_matches('/'), vhost)
}

/// Rejects virtual hosts with a leading slash, except the default `/`.
pub fn validate_virtual_host(virtual_host: &str) -> Result<()> {
    if virtual_host != "/" && virtual_host.starts_with('/') {
        return Err(RmqDumpError::config(
            "virtual host should not start with '/' (except for the default '/' virtual host)",
        ));
    }
    Ok(())
}

/// Consuming builder for [`DumpConfig`].
#[derive(Debug, Clone)]
pub struct DumpConfigBuilder {
    connection: ConnectionConfig,
    queue: QueueConfig,
    output: OutputConfig,
    filter: FilterSettings,
}

impl Default for DumpConfigBuilder {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig {
                url: compose_url(DEFAULT_URL, DEFAULT_VIRTUAL_HOST, false),
                skip_tls_verification: false,
            },
            queue: QueueConfig::default(),
            output: OutputConfig::default(),
            filter: FilterSettings::default(),
        }
    }
}

impl DumpConfigBuilder {
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.connection.url = url.into();
        self
    }

    #[must_use]
    pub fn skip_tls_verification(mut self, skip: bool) -> Self {
        self.connection.skip_tls_verification = skip;
        self
    }

    /// Sets the queue to drain. An empty name selects temporary-queue mode.
    #[must_use]
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        self.queue.queue = if queue.is_empty() { None } else { Some(queue) };
        self
    }

    #[must_use]
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.queue.exchange = exchange.into();
        self
    }

    #[must_use]
    pub fn routing_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queue.routing_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn auto_ack(mut self, auto_ack: bool) -> Self {
        self.queue.auto_ack = auto_ack;
        self
    }

    #[must_use]
    pub fn stop_after_consume(mut self, stop: bool) -> Self {
        self.queue.stop_after_consume = stop;
        self
    }

    #[must_use]
    pub fn writer(mut self, writer: WriterKind) -> Self {
        self.output.writer = writer;
        self
    }

    #[must_use]
    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output.output_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn file_mode(mut self, mode: FileMode) -> Self {
        self.output.file_mode = mode;
        self
    }

    #[must_use]
    pub fn pretty_print(mut self, pretty: bool) -> Self {
        self.output.pretty_print = pretty;
        self
    }

    #[must_use]
    pub fn include_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.filter.include_patterns.push(pattern.into());
        self
    }

    #[must_use]
    pub fn exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.filter.exclude_patterns.push(pattern.into());
        self
    }

    #[must_use]
    pub fn json_filter(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.filter.json_filter = if query.is_empty() { None } else { Some(query) };
        self
    }

    #[must_use]
    pub fn regex_filter(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.filter.regex_filter = if pattern.is_empty() {
            None
        } else {
            Some(pattern)
        };
        self
    }

    #[must_use]
    pub fn max_message_size(mut self, size: i64) -> Self {
        self.filter.max_message_size = size;
        self
    }

    /// Replaces all filter settings at once.
    #[must_use]
    pub fn filter(mut self, filter: FilterSettings) -> Self {
        self.filter = filter;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<DumpConfig> {
        let config = DumpConfig {
            connection: self.connection,
            queue: self.queue,
            output: self.output,
            filter: self.filter,
        };
        config.validate()?;
        Ok(config)
    }
}
