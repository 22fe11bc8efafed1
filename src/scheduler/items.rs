use super::OpError;
use crate::domain::{Item, ItemStatus};
use crate::store::StateDocument;

fn processing_guard(item: &Item) -> Result<(), OpError> {
    if item.status == ItemStatus::Processing {
        return Err(OpError::Conflict("Item is processing".to_string()));
    }
    Ok(())
}

/// Toggle readiness. `ready=true` queues the item; `ready=false` parks it
/// back to idle. Idempotent; refused while a job is in flight.
pub fn set_item_ready(doc: &mut StateDocument, item_id: &str, ready: bool) -> Result<Item, OpError> {
    let item = doc.find_item_mut(item_id).ok_or(OpError::NotFound("Item"))?;
    processing_guard(item)?;
    item.ready = ready;
    item.status = if ready {
        ItemStatus::Queued
    } else {
        ItemStatus::Idle
    };
    Ok(item.clone())
}

/// Clear a failed/done/queued item back to idle.
pub fn reset_item(doc: &mut StateDocument, item_id: &str) -> Result<Item, OpError> {
    let item = doc.find_item_mut(item_id).ok_or(OpError::NotFound("Item"))?;
    processing_guard(item)?;
    item.status = ItemStatus::Idle;
    item.ready = false;
    item.last_error.clear();
    Ok(item.clone())
}

/// Move an item to a new on-disk path. Deliberately permitted while
/// `processing`: the worker reports the `.mkv` destination through this call
/// when an encode changes the container extension.
pub fn update_item_path(
    doc: &mut StateDocument,
    item_id: &str,
    path: &str,
) -> Result<Item, OpError> {
    let item = doc.find_item_mut(item_id).ok_or(OpError::NotFound("Item"))?;
    item.path = path.to_string();
    Ok(item.clone())
}

/// Remove an idle item from the catalog.
pub fn delete_item(doc: &mut StateDocument, item_id: &str) -> Result<(), OpError> {
    let item = doc.find_item(item_id).ok_or(OpError::NotFound("Item"))?;
    processing_guard(item)?;
    doc.items.retain(|i| i.id != item_id);
    Ok(())
}
