//! Query-string construction.
//!
//! # Design
//! `QueryParams` keeps insertion order and allows a key to be present with
//! no value; such keys are dropped at encoding time rather than rejected at
//! build time, so optional filters can be passed straight through. Keys and
//! values are percent-encoded with the unreserved set (`A-Z a-z 0-9 - _ . ~`)
//! left intact. List values repeat the key once per element.

use serde_json::{Map, Number, Value};

/// A single query value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryScalar {
    Text(String),
    Number(Number),
    Bool(bool),
}

impl QueryScalar {
    /// Text form before percent-encoding. Numbers render as decimal text.
    pub fn to_text(&self) -> String {
        match self {
            QueryScalar::Text(text) => text.clone(),
            QueryScalar::Number(number) => number_text(number),
            QueryScalar::Bool(flag) => flag.to_string(),
        }
    }
}

/// Plain decimal text of a number: `3.0` renders as `3`, and large or tiny
/// floats are spelled out instead of using exponent notation.
pub(crate) fn number_text(number: &Number) -> String {
    match number.as_f64() {
        Some(float) if number.is_f64() => float.to_string(),
        _ => number.to_string(),
    }
}

impl From<&str> for QueryScalar {
    fn from(value: &str) -> Self {
        QueryScalar::Text(value.to_string())
    }
}

impl From<String> for QueryScalar {
    fn from(value: String) -> Self {
        QueryScalar::Text(value)
    }
}

impl From<&String> for QueryScalar {
    fn from(value: &String) -> Self {
        QueryScalar::Text(value.clone())
    }
}

impl From<bool> for QueryScalar {
    fn from(value: bool) -> Self {
        QueryScalar::Bool(value)
    }
}

impl From<f64> for QueryScalar {
    fn from(value: f64) -> Self {
        match Number::from_f64(value) {
            Some(number) => QueryScalar::Number(number),
            // NaN and the infinities have no JSON form; keep their text.
            None => QueryScalar::Text(value.to_string()),
        }
    }
}

macro_rules! integer_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for QueryScalar {
                fn from(value: $ty) -> Self {
                    QueryScalar::Number(Number::from(value))
                }
            }
        )*
    };
}

integer_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

/// A query value: one scalar or a list repeated under the same key.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Scalar(QueryScalar),
    List(Vec<QueryScalar>),
}

macro_rules! query_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for QueryValue {
                fn from(value: $ty) -> Self {
                    QueryValue::Scalar(QueryScalar::from(value))
                }
            }

            impl From<Vec<$ty>> for QueryValue {
                fn from(values: Vec<$ty>) -> Self {
                    QueryValue::List(values.into_iter().map(QueryScalar::from).collect())
                }
            }
        )*
    };
}

query_value_from!(
    QueryScalar, &str, String, &String, bool, f64, i8, i16, i32, i64, u8, u16, u32, u64, usize,
    isize
);

impl QueryValue {
    /// Convert a JSON value. `null` has no query form and yields `None`;
    /// nested objects are carried as their JSON text.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(items) => Some(QueryValue::List(
                items.iter().map(scalar_from_json).collect(),
            )),
            other => Some(QueryValue::Scalar(scalar_from_json(other))),
        }
    }
}

fn scalar_from_json(value: &Value) -> QueryScalar {
    match value {
        Value::String(text) => QueryScalar::Text(text.clone()),
        Value::Number(number) => QueryScalar::Number(number.clone()),
        Value::Bool(flag) => QueryScalar::Bool(*flag),
        Value::Null => QueryScalar::Text("null".to_string()),
        nested => QueryScalar::Text(nested.to_string()),
    }
}

/// Ordered query parameters. A `None` value marks a key as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    entries: Vec<(String, Option<QueryValue>)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.push(key, Some(value.into()));
        self
    }

    /// Add a key whose value may be absent.
    pub fn with_opt<V: Into<QueryValue>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.push(key, value.map(Into::into));
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: Option<QueryValue>) {
        self.entries.push((key.into(), value));
    }

    /// Build from the entries of a JSON object; `null` members become absent keys.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        Self {
            entries: object
                .iter()
                .map(|(key, value)| (key.clone(), QueryValue::from_json(value)))
                .collect(),
        }
    }

    /// `true` when no key carries a value.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, value)| value.is_none())
    }

    pub fn encode(&self) -> String {
        encode(self)
    }

    /// The encoded string prefixed with `?`, or empty when nothing is encoded.
    pub fn to_query_string(&self) -> String {
        let encoded = encode(self);
        if encoded.is_empty() {
            encoded
        } else {
            format!("?{encoded}")
        }
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<QueryValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), Some(value.into())))
                .collect(),
        }
    }
}

/// Encode parameters as `key=value` terms joined by `&`, without a leading `?`.
pub fn encode(params: &QueryParams) -> String {
    params
        .entries
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|value| (key, value)))
        .flat_map(|(key, value)| match value {
            QueryValue::Scalar(scalar) => vec![encode_pair(key, scalar)],
            QueryValue::List(items) => items.iter().map(|item| encode_pair(key, item)).collect(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_pair(key: &str, value: &QueryScalar) -> String {
    format!(
        "{}={}",
        urlencoding::encode(key),
        urlencoding::encode(&value.to_text())
    )
}
