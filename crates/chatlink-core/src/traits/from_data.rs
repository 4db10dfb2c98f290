//! Decoding boundary
//!
//! The gateway and REST layers hand raw JSON to `FromData::from_data` and
//! receive either a typed record or a `ModelError`. They never look inside
//! records beyond ids and guild/channel associations.

use serde::de::DeserializeOwned;
use serde::Deserialize as _;
use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::value_objects::Snowflake;

/// Build a record from a decoded JSON payload
pub trait FromData: Sized {
    /// Record name used in error messages
    const RECORD: &'static str;

    /// Decode the record, rejecting payloads that lack required fields
    fn from_data(data: &Value) -> ModelResult<Self>;
}

/// Arrays decode element-wise; the first failing element rejects the list
impl<T: FromData> FromData for Vec<T> {
    const RECORD: &'static str = T::RECORD;

    fn from_data(data: &Value) -> ModelResult<Self> {
        data.as_array()
            .ok_or_else(|| ModelError::InvalidData {
                record: Self::RECORD,
                reason: "expected a JSON array".to_string(),
            })?
            .iter()
            .map(T::from_data)
            .collect()
    }
}

/// Decode an object payload through its serde representation
pub fn decode_with_serde<T: DeserializeOwned>(record: &'static str, data: &Value) -> ModelResult<T> {
    if !data.is_object() {
        return Err(ModelError::NotAnObject { record });
    }
    T::deserialize(data).map_err(|e| ModelError::InvalidData {
        record,
        reason: e.to_string(),
    })
}

/// Read a required snowflake field
pub fn required_snowflake(
    record: &'static str,
    data: &Value,
    field: &'static str,
) -> ModelResult<Snowflake> {
    match data.get(field) {
        None | Some(Value::Null) => Err(ModelError::MissingField { record, field }),
        Some(value) => Snowflake::deserialize(value).map_err(|e| ModelError::InvalidField {
            record,
            field,
            reason: e.to_string(),
        }),
    }
}

/// Read an optional snowflake field; present-but-malformed values are errors
pub fn optional_snowflake(
    record: &'static str,
    data: &Value,
    field: &'static str,
) -> ModelResult<Option<Snowflake>> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => required_snowflake(record, data, field).map(Some),
    }
}
