//! Command-line interface definition using clap.
//!
//! This module defines:
//! - [`Args`] - global connection, output and filter flags
//! - [`Command`] - the `dump` and `monitor` subcommands
//!
//! Every global flag can also come from an `RMQDUMP_*` environment variable.
//! [`Args::into_config`] resolves everything into a validated
//! [`DumpConfig`].
//!
//! # Example
//!
//! ```rust
//! use clap::Parser;
//! use rmqdump::cli::Args;
//!
//! let args = Args::parse_from(["rmqdump", "-u", "mq:5672", "dump", "-q", "orders", "-c"]);
//! let config = args.into_config().unwrap();
//! assert_eq!(config.connection.url, "amqp://mq:5672/%2f");
//! assert!(config.queue.stop_after_consume);
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{
    DEFAULT_URL, DEFAULT_VIRTUAL_HOST, DumpConfig, FileMode, UNLIMITED_MESSAGE_SIZE, WriterKind,
    compose_url, validate_virtual_host,
};
use crate::error::Result;

/// Dump RabbitMQ queues to JSON Lines, or monitor exchanges through a
/// temporary queue, keeping only the messages your filters select.
#[derive(Parser, Debug, Clone)]
#[command(name = "rmqdump")]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    rmqdump dump -q orders -o orders.jsonl -c
    rmqdump -u mq.internal:5671 -s -v prod dump -q orders -a
    rmqdump -e events monitor -r 'order.*,payment.#' -w console -p
    rmqdump dump -q orders -j '.user.role == \"admin\"' -x test")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// RabbitMQ address (host:port) or full amqp:// / amqps:// URL
    #[arg(short, long, global = true, env = "RMQDUMP_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Virtual host
    #[arg(
        short = 'v',
        long,
        alias = "virtualhost",
        global = true,
        env = "RMQDUMP_VIRTUAL_HOST",
        default_value = DEFAULT_VIRTUAL_HOST
    )]
    pub virtual_host: String,

    /// Exchange to bind the queue to
    #[arg(short, long, global = true, env = "RMQDUMP_EXCHANGE", default_value = "")]
    pub exchange: String,

    /// Use AMQPS instead of AMQP
    #[arg(short = 's', long, global = true, env = "RMQDUMP_AMQPS")]
    pub amqps: bool,

    /// Skip TLS certificate verification (insecure)
    #[arg(short = 'k', long, global = true, env = "RMQDUMP_SKIP_TLS_VERIFY")]
    pub skip_tls_verify: bool,

    /// Where messages go: console or file
    #[arg(short, long, global = true, env = "RMQDUMP_WRITER", default_value = "file")]
    pub writer: String,

    /// Output file for the file writer
    #[arg(short, long, global = true, env = "RMQDUMP_OUTPUT", default_value = "messages.txt")]
    pub output: PathBuf,

    /// File mode: append or overwrite
    #[arg(short = 'm', long, global = true, env = "RMQDUMP_FILE_MODE", default_value = "overwrite")]
    pub file_mode: String,

    /// Pretty-print each message
    #[arg(short, long, global = true, env = "RMQDUMP_PRETTY_PRINT")]
    pub pretty_print: bool,

    /// Keep messages matching this regex (repeatable; any one must match)
    #[arg(short, long = "include", value_name = "REGEX", global = true)]
    pub include: Vec<String>,

    /// Drop messages matching this regex (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "REGEX", global = true)]
    pub exclude: Vec<String>,

    /// Keep messages whose JSON body satisfies this jq expression
    #[arg(short, long, value_name = "QUERY", global = true)]
    pub json_filter: Option<String>,

    /// Keep only messages matching this regex
    #[arg(long, value_name = "REGEX", global = true)]
    pub regex_filter: Option<String>,

    /// Maximum body size in bytes (-1 for unlimited)
    #[arg(
        short = 'z',
        long,
        value_name = "BYTES",
        global = true,
        allow_negative_numbers = true,
        default_value_t = UNLIMITED_MESSAGE_SIZE
    )]
    pub max_size: i64,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, env = "RMQDUMP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// What to consume.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Dump messages from an existing queue
    Dump {
        /// Queue name
        #[arg(short, long)]
        queue: String,

        /// Acknowledge messages (removes them from the queue)
        #[arg(short, long)]
        auto_ack: bool,

        /// Stop once the messages present at start have been consumed
        #[arg(short = 'c', long)]
        stop_after_consume: bool,
    },

    /// Monitor an exchange through a temporary queue
    #[command(alias = "mon")]
    Monitor {
        /// Routing keys to bind, comma-separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        routing_keys: Vec<String>,
    },
}

impl Args {
    /// Resolves the flags into a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RmqDumpError::Config`](crate::RmqDumpError::Config) for an
    /// unknown writer or file mode, a malformed virtual host or URL, or any
    /// other invalid combination.
    pub fn into_config(self) -> Result<DumpConfig> {
        let writer: WriterKind = self.writer.parse()?;
        let file_mode: FileMode = self.file_mode.parse()?;
        validate_virtual_host(&self.virtual_host)?;

        let mut builder = DumpConfig::builder()
            .url(compose_url(&self.url, &self.virtual_host, self.amqps))
            .skip_tls_verification(self.skip_tls_verify)
            .exchange(self.exchange)
            .writer(writer)
            .output_file(self.output)
            .file_mode(file_mode)
            .pretty_print(self.pretty_print)
            .max_message_size(self.max_size);

        for pattern in self.include {
            builder = builder.include_pattern(pattern);
        }
        for pattern in self.exclude {
            builder = builder.exclude_pattern(pattern);
        }
        if let Some(query) = self.json_filter {
            builder = builder.json_filter(query);
        }
        if let Some(regex) = self.regex_filter {
            builder = builder.regex_filter(regex);
        }

        builder = match self.command {
            Command::Dump {
                queue,
                auto_ack,
                stop_after_consume,
            } => builder
                .queue(queue)
                .auto_ack(auto_ack)
                .stop_after_consume(stop_after_consume),
            Command::Monitor { routing_keys } => builder.routing_keys(routing_keys),
        };

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_dump_defaults() {
        let config = parse(&["rmqdump", "dump", "-q", "orders"]).into_config().unwrap();
        assert_eq!(config.connection.url, "amqp://localhost:5672/%2f");
        assert_eq!(config.queue.queue.as_deref(), Some("orders"));
        assert_eq!(config.output.writer, WriterKind::File);
        assert_eq!(config.output.file_mode, FileMode::Overwrite);
        assert_eq!(config.filter.max_message_size, -1);
    }

    #[test]
    fn test_monitor_splits_routing_keys() {
        let config = parse(&["rmqdump", "-e", "events", "monitor", "-r", "a.*, b.#"])
            .into_config()
            .unwrap();
        assert_eq!(config.queue.routing_keys, vec!["a.*", " b.#"]);
        assert!(config.queue.acks_on_receipt());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let config = parse(&[
            "rmqdump", "dump", "-q", "orders", "-s", "-v", "prod", "-w", "console", "-i", "a", "-i",
            "b", "-z", "1024",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.connection.url, "amqps://localhost:5672/prod");
        assert_eq!(config.output.writer, WriterKind::Console);
        assert_eq!(config.filter.include_patterns, vec!["a", "b"]);
        assert_eq!(config.filter.max_message_size, 1024);
    }

    #[test]
    fn test_invalid_writer_is_rejected() {
        let err = parse(&["rmqdump", "-w", "printer", "dump", "-q", "q"])
            .into_config()
            .unwrap_err();
        assert!(err.to_string().contains("invalid writer type"));
    }

    #[test]
    fn test_invalid_file_mode_is_rejected() {
        let err = parse(&["rmqdump", "-m", "rotate", "dump", "-q", "q"])
            .into_config()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_leading_slash_virtual_host_is_rejected() {
        let err = parse(&["rmqdump", "-v", "/prod", "dump", "-q", "q"])
            .into_config()
            .unwrap_err();
        assert!(err.to_string().contains("virtual host"));
    }

    #[test]
    fn test_dump_requires_queue() {
        assert!(Args::try_parse_from(["rmqdump", "dump"]).is_err());
    }

    #[test]
    fn test_monitor_requires_routing_keys() {
        assert!(Args::try_parse_from(["rmqdump", "monitor"]).is_err());
    }
}
