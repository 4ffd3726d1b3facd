//! Identity extraction from feed records
//!
//! A record contributes the identities of:
//! - its author (`from.id`)
//! - its addressees (`to.id`, or `to.data[].id` for several)
//! - every tag collection (any field named `*_tags`), flattened down to the
//!   `id` leaves whatever list/object nesting the API used
//! - comment authors (`comments.data[].from.id`) when `comments.count > 0`
//! - likers (`likes.data[].id`) when `likes.count > 0`
//!
//! Missing or oddly-shaped fields contribute nothing; extraction never fails.

use serde_json::Value;
use tracing::debug;

use super::Identity;

/// Record types with a known layout; others still go through the generic rules
pub const KNOWN_RECORD_TYPES: [&str; 5] = ["status", "link", "video", "photo", "checkin"];

/// All identities referenced by one feed record, duplicates included
pub fn extract_ids(record: &Value) -> Vec<Identity> {
    let mut ids = Vec::new();

    if !record.is_object() {
        return ids;
    }

    if let Some(record_type) = record.get("type").and_then(Value::as_str) {
        if !KNOWN_RECORD_TYPES.contains(&record_type) {
            debug!(record_type = %record_type, "Feed record type has no dedicated handling");
        }
    }

    push_id(record.get("from"), &mut ids);

    if let Some(to) = record.get("to") {
        push_id(Some(to), &mut ids);
        if let Some(addressees) = to.get("data").and_then(Value::as_array) {
            for addressee in addressees {
                push_id(Some(addressee), &mut ids);
            }
        }
    }

    if let Some(fields) = record.as_object() {
        for (name, tags) in fields {
            if name.ends_with("_tags") {
                collect_tag_ids(tags, &mut ids);
            }
        }
    }

    if let Some(comments) = record.get("comments").filter(|c| has_entries(c)) {
        for comment in data_entries(comments) {
            push_id(comment.get("from"), &mut ids);
        }
    }

    if let Some(likes) = record.get("likes").filter(|l| has_entries(l)) {
        for liker in data_entries(likes) {
            push_id(Some(liker), &mut ids);
        }
    }

    ids
}

/// Identity from a JSON string ("123") or non-negative integer
pub fn parse_identity(value: &Value) -> Option<Identity> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn push_id(actor: Option<&Value>, ids: &mut Vec<Identity>) {
    if let Some(id) = actor.and_then(|a| a.get("id")).and_then(parse_identity) {
        ids.push(id);
    }
}

fn collect_tag_ids(tags: &Value, ids: &mut Vec<Identity>) {
    match tags {
        Value::Object(map) => {
            if let Some(id) = map.get("id") {
                if let Some(id) = parse_identity(id) {
                    ids.push(id);
                }
                return;
            }
            for nested in map.values() {
                collect_tag_ids(nested, ids);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_tag_ids(item, ids);
            }
        }
        _ => {}
    }
}

fn has_entries(section: &Value) -> bool {
    section
        .get("count")
        .and_then(|count| count.as_f64())
        .map_or(false, |count| count > 0.0)
}

fn data_entries(section: &Value) -> impl Iterator<Item = &Value> {
    section
        .get("data")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}
