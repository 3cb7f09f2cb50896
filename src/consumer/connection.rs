//! Broker connection setup.
//!
//! Plain `amqp://` URLs and verified `amqps://` URLs go through the client's
//! own connector. Skipping certificate verification needs a hand-built TLS
//! connector, so that path opens the TCP stream itself.

use lapin::tcp::{NativeTlsConnector, TcpStream};
use lapin::uri::{AMQPScheme, AMQPUri};
use lapin::{Connection, ConnectionProperties};
use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::error::{Result, RmqDumpError};

fn properties() -> ConnectionProperties {
    ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio)
}

/// Opens a connection as described by `config`.
///
/// # Errors
///
/// Returns [`RmqDumpError::Connection`] if the broker cannot be reached or
/// refuses the handshake, [`RmqDumpError::Config`] if the URL does not parse,
/// and [`RmqDumpError::Tls`] if the insecure TLS connector cannot be built.
pub(crate) async fn open(config: &ConnectionConfig) -> Result<Connection> {
    let masked = config.masked_url();

    let connection = if config.skip_tls_verification && config.is_secure() {
        warn!(url = %masked, "TLS certificate verification is disabled");
        open_insecure(&config.url).await?
    } else {
        Connection::connect(&config.url, properties())
            .await
            .map_err(|e| RmqDumpError::connection("connect to RabbitMQ", e))?
    };

    info!(url = %masked, "Connected to RabbitMQ");
    Ok(connection)
}

async fn open_insecure(url: &str) -> Result<Connection> {
    let uri: AMQPUri = url
        .parse()
        .map_err(|e: String| RmqDumpError::config(format!("invalid RabbitMQ URL: {}", e)))?;

    let tls = NativeTlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;

    let connect = move |uri: &AMQPUri| {
        let host = uri.authority.host.clone();
        let stream = TcpStream::connect((host.as_str(), uri.authority.port))?;
        match uri.scheme {
            AMQPScheme::AMQPS => stream.into_native_tls(&tls, &host),
            AMQPScheme::AMQP => Ok(stream),
        }
    };

    Connection::connector(uri, Box::new(connect), properties())
        .await
        .map_err(|e| RmqDumpError::connection("connect to RabbitMQ", e))
}
