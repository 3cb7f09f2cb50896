//! The exporter-facing message envelope.
//!
//! An [`Envelope`] is the serializable projection of a broker delivery. It
//! serializes as one JSON object:
//!
//! ```json
//! {"headers": {...}, "exchange": "...", "routingKey": "...", "body": ...}
//! ```
//!
//! The body is embedded as parsed JSON when it is valid JSON and as a plain
//! string otherwise.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::DateTime;
use lapin::types::{AMQPValue, FieldTable};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::Result;

/// A delivery projected for export.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawEnvelope")]
pub struct Envelope {
    /// Message headers converted to JSON, `None` when the delivery had none
    pub headers: Option<Map<String, Value>>,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Raw message body
    pub body: Vec<u8>,
}

impl Envelope {
    /// Creates an envelope without headers.
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: None,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            body: body.into(),
        }
    }

    /// Builds an envelope from the raw parts of a delivery.
    pub fn from_parts(
        headers: Option<&FieldTable>,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Self {
        Self {
            headers: headers.map(headers_to_json),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
        }
    }

    /// Builder-style method to set headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Map<String, Value>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// The body as it appears in serialized output.
    pub fn body_value(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }

    /// Serializes the envelope as a single JSON document without a trailing
    /// newline.
    pub fn to_json_line(&self, pretty: bool) -> Result<String> {
        let line = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(line)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Envelope", 4)?;
        state.serialize_field("headers", &self.headers)?;
        state.serialize_field("exchange", &self.exchange)?;
        state.serialize_field("routingKey", &self.routing_key)?;
        state.serialize_field("body", &self.body_value())?;
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default)]
    headers: Option<Map<String, Value>>,
    #[serde(default)]
    exchange: String,
    #[serde(default)]
    routing_key: String,
    #[serde(default)]
    body: Value,
}

impl From<RawEnvelope> for Envelope {
    fn from(raw: RawEnvelope) -> Self {
        let body = match raw.body {
            Value::String(text) => text.into_bytes(),
            other => other.to_string().into_bytes(),
        };
        Self {
            headers: raw.headers,
            exchange: raw.exchange,
            routing_key: raw.routing_key,
            body,
        }
    }
}

/// Converts an AMQP header table into a JSON object.
pub fn headers_to_json(table: &FieldTable) -> Map<String, Value> {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), amqp_to_json(value)))
        .collect()
}

fn float(n: f64) -> Value {
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn amqp_to_json(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(b) => Value::Bool(*b),
        AMQPValue::ShortShortInt(n) => Value::from(*n),
        AMQPValue::ShortShortUInt(n) => Value::from(*n),
        AMQPValue::ShortInt(n) => Value::from(*n),
        AMQPValue::ShortUInt(n) => Value::from(*n),
        AMQPValue::LongInt(n) => Value::from(*n),
        AMQPValue::LongUInt(n) => Value::from(*n),
        AMQPValue::LongLongInt(n) => Value::from(*n),
        AMQPValue::Float(n) => float(f64::from(*n)),
        AMQPValue::Double(n) => float(*n),
        AMQPValue::DecimalValue(d) => float(f64::from(d.value) / 10f64.powi(i32::from(d.scale))),
        AMQPValue::ShortString(s) => Value::String(s.as_str().to_string()),
        AMQPValue::LongString(s) => Value::String(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::FieldArray(items) => {
            Value::Array(items.as_slice().iter().map(amqp_to_json).collect())
        }
        AMQPValue::FieldTable(table) => Value::Object(headers_to_json(table)),
        AMQPValue::Timestamp(secs) => i64::try_from(*secs)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map_or(Value::Null, |ts| Value::String(ts.to_rfc3339())),
        AMQPValue::ByteArray(bytes) => Value::String(BASE64.encode(bytes.as_slice())),
        AMQPValue::Void => Value::Null,
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}
