use serde_json::Value;

use wallscout_common::{Contact, Note, RawNote, Source, WallScoutError};

use crate::explorer::UserExplorer;
use crate::parser::contact_id;

/// Build the domain note for a collected candidate.
///
/// The author is the item's `from_id` or `signer_id`, falling back to the
/// wall owner for community posts that carry neither. Explorer failures are
/// returned to the caller.
pub async fn assemble_note(
    candidate: &RawNote,
    source: &Source,
    explorer: &UserExplorer,
) -> Result<Note, WallScoutError> {
    let author = match contact_id(&candidate.content) {
        Some(id) => id,
        None => source.decode_parameters()?.owner_id,
    };
    let user = explorer.explore(author).await?;

    let description = candidate
        .content
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Note::new(
        candidate.id.clone(),
        candidate.link.clone(),
        description,
        Contact {
            id: author.to_string(),
            name: user.name,
            blacklisted: user.blacklisted,
        },
        source.source_type,
        source.city.clone(),
        candidate.timestamp,
    ))
}
