//! Registration message and canonical profile types.
//!
//! A [`RawMessage`] is the decoded queue body exactly as a producer sent it.
//! The normalizer collapses its field aliases into a [`NormalizedProfile`],
//! which is the only shape the rest of the pipeline reads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ─── Raw Message ────────────────────────────────────────────────────────────

/// Opaque key/value body of one queue entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMessage(Map<String, Value>);

impl RawMessage {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Decode a queue payload. Anything other than a JSON object is an error.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Scalar value of `key` rendered as a string. Strings are returned as-is,
    /// numbers and booleans in their JSON text form; `null`, arrays and
    /// objects count as absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_to_string)
    }

    /// Scalar value of `key` inside the object stored under `parent`
    /// (e.g. `merge_vars.FNAME`).
    pub fn get_nested_str(&self, parent: &str, key: &str) -> Option<String> {
        self.get(parent)
            .and_then(Value::as_object)
            .and_then(|obj| obj.get(key))
            .and_then(scalar_to_string)
    }

    /// Integer value of `key`, accepting JSON integers and integer strings.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert, handy for constructing fixtures.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }
}

impl From<Map<String, Value>> for RawMessage {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ─── Normalized Profile ─────────────────────────────────────────────────────

/// Canonical user profile produced from a [`RawMessage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedProfile {
    // identity
    pub application_id: Option<String>,
    pub user_country: Option<String>,
    pub campaign_country: Option<String>,
    pub northstar_id: Option<String>,
    pub source: Option<String>,
    pub activity: Option<String>,

    // contact
    pub mobile: Option<String>,
    pub email: Option<String>,
    /// Opt-in path / list the user is subscribed to.
    pub service_path_id: Option<String>,

    // person
    pub first_name: Option<String>,
    pub last_name: Option<String>,

    // address
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,

    // dates
    /// ISO `YYYY-MM-DD`, UTC.
    pub birthdate: Option<String>,
    pub birth_year: Option<i32>,

    pub school: SchoolDetails,

    /// Campaign-specific values keyed by the name a provider expects.
    /// Only filled for recognized application codes.
    pub campaign_fields: BTreeMap<String, String>,
}

impl NormalizedProfile {
    /// Mobile number, treating an empty string as absent.
    pub fn mobile(&self) -> Option<&str> {
        self.mobile.as_deref().filter(|m| !m.trim().is_empty())
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }
}

/// School details carried by user-import sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolDetails {
    pub hs_name: Option<String>,
    pub school_name: Option<String>,
    pub afterschool_optin: Option<String>,
}
