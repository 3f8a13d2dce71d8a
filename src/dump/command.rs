//! Target engine commands emitted by a dump.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

// =============================================================================
// Flags
// =============================================================================

pub const TABLE_NO_KEY: &str = "TABLE_NO_KEY";
pub const TABLE_HASH_KEY: &str = "TABLE_HASH_KEY";
pub const TABLE_PAT_KEY: &str = "TABLE_PAT_KEY";
pub const TABLE_DAT_KEY: &str = "TABLE_DAT_KEY";

pub const COLUMN_SCALAR: &str = "COLUMN_SCALAR";
pub const COLUMN_VECTOR: &str = "COLUMN_VECTOR";
pub const COLUMN_INDEX: &str = "COLUMN_INDEX";

pub const WITH_SECTION: &str = "WITH_SECTION";
pub const WITH_WEIGHT: &str = "WITH_WEIGHT";
pub const WITH_POSITION: &str = "WITH_POSITION";

/// Ordered flag tokens, rendered pipe-joined (`COLUMN_INDEX|WITH_POSITION`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags(Vec<&'static str>);

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: &'static str) {
        self.0.push(token);
    }

    pub fn tokens(&self) -> &[&'static str] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("|"))
    }
}

impl Serialize for Flags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// =============================================================================
// table_create
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "table_create")]
pub struct TableCreate {
    pub dataset: Option<String>,
    pub body: TableCreateBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCreateBody {
    pub name: Option<String>,
    pub flags: Flags,
    pub key_type: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tokenizer: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalizer: Option<Value>,
}

// =============================================================================
// column_create
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "column_create")]
pub struct ColumnCreate {
    pub dataset: Option<String>,
    pub body: ColumnCreateBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCreateBody {
    pub table: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub value_type: Value,
    pub flags: Flags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

// =============================================================================
// Command
// =============================================================================

/// Name of the ingest verb records are rewritten to.
pub const ADD: &str = "add";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Command {
    TableCreate(TableCreate),
    ColumnCreate(ColumnCreate),
    /// A record message with its envelope rewritten; `type` is already `add`.
    Add(Map<String, Value>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::TableCreate(_) => "table_create",
            Command::ColumnCreate(_) => "column_create",
            Command::Add(_) => ADD,
        }
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl From<TableCreate> for Command {
    fn from(command: TableCreate) -> Self {
        Command::TableCreate(command)
    }
}

impl From<ColumnCreate> for Command {
    fn from(command: ColumnCreate) -> Self {
        Command::ColumnCreate(command)
    }
}
