use crate::core::errors::ExchangeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;
use url::form_urlencoded;

/// Turns a request payload into wire text
///
/// Input is the payload already lowered to a [`serde_json::Value`]; the
/// requester does that with `serde_json::to_value` so every serializer sees
/// the same shape. Output for identical input is identical.
pub trait DataSerializer: Send + Sync {
    fn serialize(&self, input: &Value) -> Result<String, ExchangeError>;

    /// Content type of a body produced by this serializer
    fn content_type(&self) -> &'static str;
}

/// Turns response bytes into a typed value
pub trait DataDeserializer: Send + Sync {
    /// Empty (or whitespace only) content yields [`ExchangeError::EmptyResponse`],
    /// content that doesn't parse yields [`ExchangeError::DeserializationError`]
    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ExchangeError>;
}

/// How array values are written into a query string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArrayParametersSerialization {
    /// `key=a&key=b`
    #[default]
    MultipleValues,
    /// `key[]=a&key[]=b`
    Array,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlParametersSerializer {
    pub array_serialization: ArrayParametersSerialization,
}

impl UrlParametersSerializer {
    pub const fn new(array_serialization: ArrayParametersSerialization) -> Self {
        Self {
            array_serialization,
        }
    }
}

impl DataSerializer for UrlParametersSerializer {
    fn serialize(&self, input: &Value) -> Result<String, ExchangeError> {
        encode_parameters(input, self.array_serialization)
    }

    fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }
}

/// Form-encoded request bodies; arrays are written as repeated keys
#[derive(Debug, Clone, Copy, Default)]
pub struct FormDataSerializer;

impl DataSerializer for FormDataSerializer {
    fn serialize(&self, input: &Value) -> Result<String, ExchangeError> {
        encode_parameters(input, ArrayParametersSerialization::MultipleValues)
    }

    fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBodySerializer;

impl DataSerializer for JsonBodySerializer {
    fn serialize(&self, input: &Value) -> Result<String, ExchangeError> {
        if input.is_null() {
            return Ok(String::new());
        }
        serde_json::to_string(input).map_err(|e| {
            ExchangeError::SerializationError(format!("Failed to serialize request body: {}", e))
        })
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDeserializer;

impl DataDeserializer for JsonDeserializer {
    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ExchangeError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(ExchangeError::EmptyResponse);
        }
        trace!("Deserializing {} bytes", data.len());
        serde_json::from_slice(data).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to parse JSON response: {}", e))
        })
    }
}

fn encode_parameters(
    input: &Value,
    array_serialization: ArrayParametersSerialization,
) -> Result<String, ExchangeError> {
    let parameters: &Map<String, Value> = match input {
        Value::Null => return Ok(String::new()),
        Value::Object(map) => map,
        other => {
            return Err(ExchangeError::SerializationError(format!(
                "Expected a parameter object, got {}",
                value_kind(other)
            )));
        }
    };

    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in parameters {
        match value {
            // unset optional fields are omitted, never written as empty
            Value::Null => {}
            Value::Array(items) => {
                let key = match array_serialization {
                    ArrayParametersSerialization::MultipleValues => key.clone(),
                    ArrayParametersSerialization::Array => format!("{}[]", key),
                };
                for item in items {
                    query.append_pair(&key, &scalar_to_string(key.as_str(), item)?);
                }
            }
            scalar => {
                query.append_pair(key, &scalar_to_string(key, scalar)?);
            }
        }
    }
    Ok(query.finish())
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String, ExchangeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(ExchangeError::SerializationError(format!(
            "Parameter '{}' has unsupported nested {}",
            key,
            value_kind(other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
