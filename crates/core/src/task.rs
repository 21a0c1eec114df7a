use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribute key: integer priority, higher runs first.
pub const ATTR_PRIORITY: &str = "priority";
/// Attribute key: deadline, either a native timestamp or an ISO-8601 string.
pub const ATTR_DEADLINE: &str = "deadline";
/// Attribute key: tenant used for fairness accounting.
pub const ATTR_TENANT_ID: &str = "tenantId";
/// Attribute key: ordered list of workflow ids this task waits on.
pub const ATTR_DEPENDS_ON: &str = "dependsOn";
/// Attribute key: remaining critical path length.
pub const ATTR_CRITICAL_LEN: &str = "criticalLen";
/// Attribute key: resource name -> required amount.
pub const ATTR_REQUIRED_RESOURCES: &str = "requiredResources";

/// A unit of work waiting in a client's ready queue.
///
/// `payload` is forwarded verbatim to the dispatcher; `attributes` is the
/// side-channel strategies read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub workflow_type: String,
    pub workflow_id: String,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub attributes: HashMap<String, AttrValue>,
}

/// Typed attribute values. Submitted JSON maps onto these variants; strings
/// stay strings (a deadline string is parsed by the strategy that reads it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    List(Vec<AttrValue>),
    Map(HashMap<String, AttrValue>),
}

/// Outcome of a typed attribute lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrLookup<T> {
    Present(T),
    WrongType,
    Absent,
}

impl<T> AttrLookup<T> {
    /// Collapse to `Option`: a mistyped attribute reads as absent.
    pub fn ok(self) -> Option<T> {
        match self {
            AttrLookup::Present(v) => Some(v),
            AttrLookup::WrongType | AttrLookup::Absent => None,
        }
    }
}

/// Conversion from an [`AttrValue`] into a concrete Rust type.
///
/// Returns `None` when the stored variant does not match.
pub trait FromAttr: Sized {
    fn from_attr(value: &AttrValue) -> Option<Self>;
}

impl FromAttr for i64 {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromAttr for f64 {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl FromAttr for bool {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromAttr for String {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromAttr for DateTime<Utc> {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl FromAttr for Vec<String> {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::List(items) => items
                .iter()
                .map(|item| match item {
                    AttrValue::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

impl FromAttr for HashMap<String, i64> {
    fn from_attr(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| i64::from_attr(v).map(|n| (k.clone(), n)))
                .collect(),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(v: DateTime<Utc>) -> Self {
        AttrValue::Timestamp(v)
    }
}

impl From<Vec<&str>> for AttrValue {
    fn from(v: Vec<&str>) -> Self {
        AttrValue::List(v.into_iter().map(AttrValue::from).collect())
    }
}

impl From<HashMap<String, i64>> for AttrValue {
    fn from(v: HashMap<String, i64>) -> Self {
        AttrValue::Map(v.into_iter().map(|(k, n)| (k, AttrValue::Int(n))).collect())
    }
}

impl Task {
    /// Create a task with empty payload and attributes.
    pub fn new(workflow_type: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            workflow_id: workflow_id.into(),
            payload: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style payload setter.
    pub fn with_payload(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Look up an attribute, distinguishing a mistyped value from a missing one.
    pub fn lookup<T: FromAttr>(&self, key: &str) -> AttrLookup<T> {
        match self.attributes.get(key) {
            None => AttrLookup::Absent,
            Some(value) => match T::from_attr(value) {
                Some(v) => AttrLookup::Present(v),
                None => AttrLookup::WrongType,
            },
        }
    }

    /// Typed attribute accessor. Missing and mistyped attributes are both `None`.
    pub fn attr<T: FromAttr>(&self, key: &str) -> Option<T> {
        self.lookup(key).ok()
    }

    /// Raw attribute value, untyped.
    pub fn raw_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Tenant this task is accounted against: payload `tenantId` first,
    /// then the `tenantId` attribute.
    pub fn tenant(&self) -> Option<String> {
        self.payload
            .get(ATTR_TENANT_ID)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.attr::<String>(ATTR_TENANT_ID))
    }
}
