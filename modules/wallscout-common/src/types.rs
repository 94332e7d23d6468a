use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::WallScoutError;
use crate::json::value_as_i64;

// --- Sources ---

/// A configured wall to harvest. Owned by the source registry; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    #[serde(rename = "type")]
    pub source_type: i32,
    pub city: String,
    /// Raw JSON object text; see [`SourceParameters`].
    pub parameters: String,
}

impl Source {
    /// Cursor store key for this source.
    pub fn cursor_key(&self) -> String {
        format!("config_{}", self.id)
    }

    /// `<source id>-<item id>`, unique per harvested item.
    pub fn composite_id(&self, item_id: &str) -> String {
        format!("{}-{}", self.id, item_id)
    }

    pub fn decode_parameters(&self) -> Result<SourceParameters, WallScoutError> {
        SourceParameters::decode(&self.parameters)
    }
}

/// Decoded `Source::parameters`. `owner_id` and `count` are required; any other
/// keys are forwarded to the feed request untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceParameters {
    pub owner_id: i64,
    pub count: u32,
    pub extra: Map<String, Value>,
}

impl SourceParameters {
    pub fn decode(raw: &str) -> Result<Self, WallScoutError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| WallScoutError::Validation(format!("parameters are not valid JSON: {e}")))?;
        let Value::Object(mut map) = value else {
            return Err(WallScoutError::Validation(
                "parameters must be a JSON object".to_string(),
            ));
        };

        let owner_id = take_integer(&mut map, "owner_id")?;
        let count = take_integer(&mut map, "count")?;
        let count = u32::try_from(count).map_err(|_| {
            WallScoutError::Validation(format!("parameter \"count\" out of range: {count}"))
        })?;

        Ok(Self {
            owner_id,
            count,
            extra: map,
        })
    }

    /// Feed request parameters for the page starting at `offset`.
    pub fn to_query(&self, offset: u64) -> Vec<(String, String)> {
        let mut query = vec![
            ("owner_id".to_string(), self.owner_id.to_string()),
            ("count".to_string(), self.count.to_string()),
        ];
        for (key, value) in &self.extra {
            if key == "offset" {
                continue;
            }
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            query.push((key.clone(), value));
        }
        query.push(("offset".to_string(), offset.to_string()));
        query
    }
}

fn take_integer(map: &mut Map<String, Value>, key: &str) -> Result<i64, WallScoutError> {
    let value = map
        .remove(key)
        .ok_or_else(|| WallScoutError::Validation(format!("parameters have no key \"{key}\"")))?;
    value_as_i64(&value).ok_or_else(|| {
        WallScoutError::Validation(format!("parameter \"{key}\" is not an integer: {value}"))
    })
}

// --- Harvested records ---

/// A candidate built from one accepted wall item. Not persisted by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNote {
    /// `<source id>-<item id>`
    pub id: String,
    pub link: String,
    /// Unix seconds.
    pub timestamp: i64,
    /// The wall item exactly as the API returned it.
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub blacklisted: bool,
}

/// The stored domain record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    /// Composite id of the wall item this note was built from.
    pub external_id: String,
    pub link: String,
    pub description: String,
    pub description_hash: String,
    pub contact: Contact,
    #[serde(rename = "type")]
    pub note_type: i32,
    pub city: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub duplicated: bool,
}

impl Note {
    /// Fresh note with a new id and the description fingerprint computed.
    pub fn new(
        external_id: String,
        link: String,
        description: String,
        contact: Contact,
        note_type: i32,
        city: String,
        timestamp: i64,
    ) -> Self {
        let description_hash = description_fingerprint(&description);
        Self {
            id: Uuid::new_v4(),
            external_id,
            link,
            description,
            description_hash,
            contact,
            note_type,
            city,
            timestamp,
            duplicated: false,
        }
    }
}

/// Hex SHA-256 of the description with whitespace collapsed and case folded,
/// so reposts that only differ in spacing or case collide.
pub fn description_fingerprint(description: &str) -> String {
    let normalized = description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// A resolved author profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub blacklisted: bool,
}

impl User {
    /// Stand-in for ids the lookup did not return.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }
}

// --- Queue messages ---

/// Inbound: a candidate note plus the source it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectMessage {
    pub note: Note,
    pub source: Source,
}

/// Outbound: announce an accepted note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub note: Note,
}
