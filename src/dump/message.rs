//! Dump protocol messages.
//!
//! A dump is requested with a single `dump` message and answered with a
//! stream of `dump.*` messages produced by one or more workers inside the
//! cluster. Payloads arrive as decoded JSON of unknown shape; [`classify`]
//! turns one delivery into a [`DumpMessage`].

use crate::error::DumpError;
use crate::transport::Inbound;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default throttle, same as the engine's own default.
pub const DEFAULT_MESSAGES_PER_SECOND: u32 = 10000;

/// Status code of a successful `dump.result`.
pub const STATUS_OK: i64 = 200;

// =============================================================================
// Request
// =============================================================================

/// The subscription request: `{type: "dump", dataset, body: {messagesPerSecond}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "dump")]
pub struct DumpRequest {
    pub dataset: String,
    pub body: DumpRequestBody,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpRequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_per_second: Option<u32>,
}

impl DumpRequest {
    pub fn new(dataset: impl Into<String>, messages_per_second: Option<u32>) -> Self {
        Self {
            dataset: dataset.into(),
            body: DumpRequestBody {
                messages_per_second,
            },
        }
    }
}

// =============================================================================
// Message kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Start,
    End,
    Forecast,
    Table,
    Column,
    Record,
    Result,
    Error,
}

impl MessageKind {
    pub fn from_type(s: &str) -> Option<Self> {
        match s {
            "dump.start" => Some(Self::Start),
            "dump.end" => Some(Self::End),
            "dump.forecast" => Some(Self::Forecast),
            "dump.table" => Some(Self::Table),
            "dump.column" => Some(Self::Column),
            "dump.record" => Some(Self::Record),
            "dump.result" => Some(Self::Result),
            "dump.error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_type(&self) -> &'static str {
        match self {
            Self::Start => "dump.start",
            Self::End => "dump.end",
            Self::Forecast => "dump.forecast",
            Self::Table => "dump.table",
            Self::Column => "dump.column",
            Self::Record => "dump.record",
            Self::Result => "dump.result",
            Self::Error => "dump.error",
        }
    }
}

// =============================================================================
// Bodies
// =============================================================================

/// Ruby-style truthiness: everything except `null` and `false`.
pub(crate) fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastBody {
    #[serde(default)]
    pub n_messages: i64,
}

/// Storage scheme of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    Array,
    Hash,
    PatriciaTrie,
    DoubleArrayTrie,
}

impl TableType {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "Array" => Some(Self::Array),
            "Hash" => Some(Self::Hash),
            "PatriciaTrie" => Some(Self::PatriciaTrie),
            "DoubleArrayTrie" => Some(Self::DoubleArrayTrie),
            _ => None,
        }
    }
}

/// Body of `dump.table`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Value,
    #[serde(default)]
    pub key_type: Value,
    #[serde(default)]
    pub tokenizer: Value,
    #[serde(default)]
    pub normalizer: Value,
}

impl TableBody {
    pub fn table_type(&self) -> Option<TableType> {
        self.kind.as_str().and_then(TableType::from_name)
    }
}

/// Kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Scalar,
    Vector,
    Index,
}

impl ColumnType {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "Scalar" => Some(Self::Scalar),
            "Vector" => Some(Self::Vector),
            "Index" => Some(Self::Index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VectorOptions {
    #[serde(default)]
    pub weight: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IndexOptions {
    #[serde(default)]
    pub section: Value,
    #[serde(default)]
    pub weight: Value,
    #[serde(default)]
    pub position: Value,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

/// Body of `dump.column`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnBody {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value_type: Value,
    #[serde(rename = "type", default)]
    pub kind: Value,
    #[serde(default)]
    pub vector_options: Option<VectorOptions>,
    #[serde(default)]
    pub index_options: Option<IndexOptions>,
}

impl ColumnBody {
    pub fn column_type(&self) -> Option<ColumnType> {
        self.kind.as_str().and_then(ColumnType::from_name)
    }
}

/// Status carried by `dump.result` and `dump.error`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub status_code: Option<i64>,
    pub name: Value,
    pub message: Value,
}

impl StatusReport {
    /// Anything but an explicit 200 fails the dump.
    pub fn is_failure(&self) -> bool {
        self.status_code != Some(STATUS_OK)
    }

    pub fn into_error(self) -> DumpError {
        DumpError::Engine {
            status_code: self.status_code.unwrap_or_default(),
            name: text_of(&self.name),
            message: text_of(&self.message),
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Classified messages
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DumpMessage {
    Start { dataset: Option<String> },
    End { dataset: Option<String> },
    Forecast { dataset: Option<String>, body: ForecastBody },
    Table { dataset: Option<String>, body: TableBody },
    Column { dataset: Option<String>, body: ColumnBody },
    /// The whole record message, envelope included.
    Record(Map<String, Value>),
    Result(StatusReport),
    Error(StatusReport),
    /// A `type` this client does not act on.
    Unknown(String),
}

impl DumpMessage {
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Self::Start { .. } => Some(MessageKind::Start),
            Self::End { .. } => Some(MessageKind::End),
            Self::Forecast { .. } => Some(MessageKind::Forecast),
            Self::Table { .. } => Some(MessageKind::Table),
            Self::Column { .. } => Some(MessageKind::Column),
            Self::Record(_) => Some(MessageKind::Record),
            Self::Result(_) => Some(MessageKind::Result),
            Self::Error(_) => Some(MessageKind::Error),
            Self::Unknown(_) => None,
        }
    }
}

/// Classify one delivery. `None` means the transport delivered nothing.
pub fn classify(inbound: Option<&Inbound>) -> Result<DumpMessage, DumpError> {
    match inbound {
        None => Err(DumpError::NilMessage),
        Some(Inbound::Fault(fault)) => Err(DumpError::Transport(fault.description.clone())),
        Some(Inbound::Payload(Value::Object(map))) => classify_map(map),
        Some(Inbound::Payload(other)) => Err(DumpError::InvalidMessage(other.to_string())),
    }
}

fn classify_map(map: &Map<String, Value>) -> Result<DumpMessage, DumpError> {
    let invalid = || DumpError::InvalidMessage(Value::Object(map.clone()).to_string());

    let type_name = map.get("type").and_then(Value::as_str).ok_or_else(invalid)?;
    let Some(kind) = MessageKind::from_type(type_name) else {
        return Ok(DumpMessage::Unknown(type_name.to_string()));
    };

    let dataset = match map.get("dataset") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(invalid()),
    };

    let message = match kind {
        MessageKind::Start => DumpMessage::Start { dataset },
        MessageKind::End => DumpMessage::End { dataset },
        MessageKind::Forecast => DumpMessage::Forecast {
            dataset,
            body: body_of(map).ok_or_else(invalid)?,
        },
        MessageKind::Table => DumpMessage::Table {
            dataset,
            body: body_of(map).ok_or_else(invalid)?,
        },
        MessageKind::Column => DumpMessage::Column {
            dataset,
            body: body_of(map).ok_or_else(invalid)?,
        },
        MessageKind::Record => DumpMessage::Record(map.clone()),
        MessageKind::Result => DumpMessage::Result(status_of(map)),
        MessageKind::Error => DumpMessage::Error(status_of(map)),
    };
    Ok(message)
}

fn body_of<T: for<'de> Deserialize<'de>>(map: &Map<String, Value>) -> Option<T> {
    let body = map.get("body")?;
    T::deserialize(body).ok()
}

fn status_of(map: &Map<String, Value>) -> StatusReport {
    let body = map.get("body");
    let field = |key: &str| {
        body.and_then(|b| b.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    };

    // The status normally rides on the envelope; some engines put it in the body.
    let status_code = map
        .get("statusCode")
        .and_then(Value::as_i64)
        .or_else(|| body.and_then(|b| b.get("statusCode")).and_then(Value::as_i64));

    StatusReport {
        status_code,
        name: field("name"),
        message: field("message"),
    }
}
