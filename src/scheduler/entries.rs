use chrono::{DateTime, Utc};
use tracing::info;

use super::OpError;
use crate::domain::{Entry, ItemStatus, find_reserved_arg_token, new_id};
use crate::store::StateDocument;

fn validate_args_fragment(args: &str) -> Result<(), OpError> {
    if let Some(token) = find_reserved_arg_token(args) {
        return Err(OpError::Validation(format!(
            "encoder args must not contain {token}"
        )));
    }
    Ok(())
}

/// Register a new root directory. `path` must already be absolute (the
/// handler resolves it); the display name defaults to the final component.
pub fn add_entry(
    doc: &mut StateDocument,
    path: String,
    name: Option<String>,
    args: String,
    now: DateTime<Utc>,
) -> Result<Entry, OpError> {
    validate_args_fragment(&args)?;
    let name = name.unwrap_or_else(|| {
        std::path::Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone())
    });

    let entry = Entry {
        id: new_id("ent"),
        name,
        path,
        args,
        notes: String::new(),
        created_at: now,
        updated_at: now,
        last_scan_at: None,
        extras: serde_json::Map::new(),
    };
    info!(entry_id = %entry.id, path = %entry.path, "entry added");
    doc.entries.push(entry.clone());
    Ok(entry)
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    pub name: Option<String>,
    pub args: Option<String>,
    pub notes: Option<String>,
}

pub fn update_entry(
    doc: &mut StateDocument,
    entry_id: &str,
    patch: EntryPatch,
    now: DateTime<Utc>,
) -> Result<Entry, OpError> {
    if let Some(args) = &patch.args {
        validate_args_fragment(args)?;
    }
    let entry = doc
        .find_entry_mut(entry_id)
        .ok_or(OpError::NotFound("Entry"))?;
    if let Some(name) = patch.name {
        entry.name = name;
    }
    if let Some(args) = patch.args {
        entry.args = args;
    }
    if let Some(notes) = patch.notes {
        entry.notes = notes;
    }
    entry.updated_at = now;
    Ok(entry.clone())
}

/// Delete an entry and cascade to its items and their jobs. Refused while
/// any of its items is mid-encode.
pub fn delete_entry(doc: &mut StateDocument, entry_id: &str) -> Result<(), OpError> {
    if doc.find_entry(entry_id).is_none() {
        return Err(OpError::NotFound("Entry"));
    }

    let entry_items: Vec<&crate::domain::Item> = doc
        .items
        .iter()
        .filter(|i| i.entry_id == entry_id)
        .collect();
    if entry_items
        .iter()
        .any(|i| i.status == ItemStatus::Processing)
    {
        return Err(OpError::Conflict("Entry has processing items".to_string()));
    }

    let removed_item_ids: std::collections::HashSet<String> =
        entry_items.iter().map(|i| i.id.clone()).collect();

    doc.entries.retain(|e| e.id != entry_id);
    doc.items.retain(|i| i.entry_id != entry_id);
    doc.jobs.retain(|j| !removed_item_ids.contains(&j.item_id));
    info!(entry_id, items = removed_item_ids.len(), "entry deleted");
    Ok(())
}
