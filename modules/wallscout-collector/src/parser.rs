use serde_json::Value;

use wallscout_common::json::{value_as_i64, value_to_string};
use wallscout_common::{Source, WallScoutError};

/// Canonical fields pulled out of one raw item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub id: String,
    pub link: String,
    pub timestamp: i64,
}

/// Turns an accepted raw item into its canonical identity, link and timestamp.
pub trait RecordParser: Send + Sync {
    fn parse(&self, source: &Source, item: &Value) -> Result<ParsedItem, WallScoutError>;
}

/// Parser for `wall.get` posts.
pub struct WallPostParser;

impl RecordParser for WallPostParser {
    fn parse(&self, source: &Source, item: &Value) -> Result<ParsedItem, WallScoutError> {
        let id = item
            .get("id")
            .and_then(value_to_string)
            .ok_or_else(|| WallScoutError::DataShape("Key \"id\" is missing".to_string()))?;
        let timestamp = item
            .get("date")
            .and_then(value_as_i64)
            .ok_or_else(|| WallScoutError::DataShape("Key \"date\" is missing".to_string()))?;
        let owner_id = match item.get("owner_id").and_then(value_as_i64) {
            Some(owner_id) => owner_id,
            None => source.decode_parameters()?.owner_id,
        };

        Ok(ParsedItem {
            link: wall_link(owner_id, &id),
            id,
            timestamp,
        })
    }
}

pub fn wall_link(owner_id: i64, post_id: &str) -> String {
    format!("https://vk.com/wall{owner_id}_{post_id}")
}

/// Author of a wall item: `from_id`, else `signer_id`.
pub fn contact_id(item: &Value) -> Option<i64> {
    ["from_id", "signer_id"]
        .iter()
        .find_map(|key| item.get(*key).and_then(value_as_i64))
}
