//! Translation of dump messages into target engine commands.
//!
//! All functions here are pure. Unexpected descriptors never fail a dump:
//! an unknown table or column type simply produces empty flags.

use super::command::{
    ColumnCreate, ColumnCreateBody, Flags, TableCreate, TableCreateBody, ADD, COLUMN_INDEX,
    COLUMN_SCALAR, COLUMN_VECTOR, TABLE_DAT_KEY, TABLE_HASH_KEY, TABLE_NO_KEY, TABLE_PAT_KEY,
    WITH_POSITION, WITH_SECTION, WITH_WEIGHT,
};
use super::message::{is_truthy, ColumnBody, ColumnType, TableBody, TableType};
use serde_json::{Map, Value};

/// Correlation field of the dump protocol, meaningless to the target engine.
const IN_REPLY_TO: &str = "inReplyTo";

/// Optional table setting worth emitting: not `null`, `false` or `""`.
fn present_value(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) if s.is_empty() => None,
        value if is_truthy(value) => Some(value.clone()),
        _ => None,
    }
}

pub fn table_flags(table_type: Option<TableType>) -> Flags {
    let mut flags = Flags::new();
    match table_type {
        Some(TableType::Array) => flags.push(TABLE_NO_KEY),
        Some(TableType::Hash) => flags.push(TABLE_HASH_KEY),
        Some(TableType::PatriciaTrie) => flags.push(TABLE_PAT_KEY),
        Some(TableType::DoubleArrayTrie) => flags.push(TABLE_DAT_KEY),
        None => {}
    }
    flags
}

/// `dump.table` -> `table_create`
pub fn translate_table(dataset: Option<String>, body: &TableBody) -> TableCreate {
    let table_type = body.table_type();
    if table_type.is_none() {
        tracing::warn!(table = ?body.name, kind = %body.kind, "unknown table type, no flags");
    }

    TableCreate {
        dataset,
        body: TableCreateBody {
            name: body.name.clone(),
            flags: table_flags(table_type),
            key_type: body.key_type.clone(),
            default_tokenizer: present_value(&body.tokenizer),
            normalizer: present_value(&body.normalizer),
        },
    }
}

pub fn column_flags(body: &ColumnBody) -> Flags {
    let mut flags = Flags::new();
    match body.column_type() {
        Some(ColumnType::Scalar) => flags.push(COLUMN_SCALAR),
        Some(ColumnType::Vector) => {
            flags.push(COLUMN_VECTOR);
            if let Some(options) = &body.vector_options {
                if is_truthy(&options.weight) {
                    flags.push(WITH_WEIGHT);
                }
            }
        }
        Some(ColumnType::Index) => {
            flags.push(COLUMN_INDEX);
            if let Some(options) = &body.index_options {
                // Order is fixed regardless of the option order on the wire.
                if is_truthy(&options.section) {
                    flags.push(WITH_SECTION);
                }
                if is_truthy(&options.weight) {
                    flags.push(WITH_WEIGHT);
                }
                if is_truthy(&options.position) {
                    flags.push(WITH_POSITION);
                }
            }
        }
        None => {}
    }
    flags
}

/// Comma-joined index sources, only for index columns with at least one source.
pub fn column_source(body: &ColumnBody) -> Option<String> {
    if body.column_type() != Some(ColumnType::Index) {
        return None;
    }
    let sources = body.index_options.as_ref()?.sources.as_ref()?;
    if sources.is_empty() {
        None
    } else {
        Some(sources.join(","))
    }
}

/// `dump.column` -> `column_create`
pub fn translate_column(dataset: Option<String>, body: &ColumnBody) -> ColumnCreate {
    if body.column_type().is_none() {
        tracing::warn!(column = ?body.name, kind = %body.kind, "unknown column type, no flags");
    }

    ColumnCreate {
        dataset,
        body: ColumnCreateBody {
            table: body.table.clone(),
            name: body.name.clone(),
            value_type: body.value_type.clone(),
            flags: column_flags(body),
            source: column_source(body),
        },
    }
}

/// `dump.record` -> `add`
///
/// Only the envelope changes: `inReplyTo` is dropped and `type` becomes
/// `add`. Record contents pass through untouched.
pub fn translate_record(message: &Map<String, Value>) -> Map<String, Value> {
    let mut add = message.clone();
    add.remove(IN_REPLY_TO);
    add.insert("type".to_string(), Value::String(ADD.to_string()));
    add
}
