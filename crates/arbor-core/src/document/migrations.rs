//! Schema upgrades
//!
//! Each step turns a version `n` document into version `n + 1` on the raw JSON
//! value, so old shapes never need a Rust type. Steps are total: fields they
//! would add are only filled in when absent, and running a step on an already
//! upgraded document leaves it unchanged. Versions without a step had no shape
//! change and are simply bumped.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{DocumentError, CURRENT_VERSION, OLDEST_VERSION};
use crate::models::NodeId;
use crate::registry::DEFAULT_TAG_COLOR;
use crate::timestamp::Timestamp;

/// Field names whose values are timestamps wherever they appear
pub const TIMESTAMP_FIELDS: &[&str] = &[
    "created",
    "modified",
    "accessed",
    "contentModified",
    "contentAccessed",
];

/// Inputs a migration may need besides the document
#[derive(Debug, Clone)]
pub struct MigrationContext {
    /// Used for timestamps a legacy document never recorded
    pub now: Timestamp,
}

type Step = fn(&mut Map<String, Value>, &MigrationContext) -> Result<(), DocumentError>;

/// Step that upgrades a document from the given version
fn step_from(version: u32) -> Option<Step> {
    match version {
        4 => Some(nest_flat_nodes),
        8 => Some(wrap_rich_text),
        9 => Some(rename_anchor_fields),
        10 => Some(default_file_and_tag_fields),
        _ => None,
    }
}

/// Upgrade `document` to [`CURRENT_VERSION`], then revive timestamps
///
/// Revival runs last so fields a step renames or copies into a timestamp
/// field are canonicalized too.
pub(crate) fn upgrade(mut document: Value, context: &MigrationContext) -> Result<Value, DocumentError> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| DocumentError::Migration {
            from: 0,
            reason: "document is not a JSON object".to_string(),
        })?;

    let found = root
        .get("version")
        .ok_or(DocumentError::MissingVersion)?
        .as_i64()
        .ok_or(DocumentError::MissingVersion)?;
    if found < i64::from(OLDEST_VERSION) || found > i64::from(CURRENT_VERSION) {
        return Err(DocumentError::UnsupportedVersion { found });
    }

    let mut version = found as u32;
    if version < CURRENT_VERSION {
        info!("Upgrading library document from version {} to {}", version, CURRENT_VERSION);
    }
    while version < CURRENT_VERSION {
        if let Some(step) = step_from(version) {
            debug!("Applying migration {} -> {}", version, version + 1);
            step(root, context)?;
        }
        version += 1;
        root.insert("version".to_string(), json!(version));
    }

    revive_timestamps(&mut document, None)?;
    Ok(document)
}

/// Rewrite every timestamp field into canonical form
///
/// Strings in any accepted layout and millisecond numbers are both read.
fn revive_timestamps(value: &mut Value, key: Option<&str>) -> Result<(), DocumentError> {
    if let Some(field) = key.filter(|k| TIMESTAMP_FIELDS.contains(k)) {
        let parsed = match value {
            Value::String(raw) => Some(Timestamp::parse(raw)),
            Value::Number(n) => n.as_i64().map(Timestamp::from_millis),
            _ => None,
        };
        if let Some(parsed) = parsed {
            let ts = parsed.map_err(|source| DocumentError::Timestamp {
                field: field.to_string(),
                source,
            })?;
            *value = Value::String(ts.to_rfc3339());
            return Ok(());
        }
    }

    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                revive_timestamps(v, Some(k.as_str()))?;
            }
        }
        Value::Array(items) => {
            for item in items {
                revive_timestamps(item, None)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Call `f` on every node object of the nested forest
fn for_each_node(root: &mut Map<String, Value>, f: &mut dyn FnMut(&mut Map<String, Value>)) {
    let Some(Value::Array(nodes)) = root.get_mut("nodes") else {
        return;
    };
    let mut pending: Vec<&mut Value> = nodes.iter_mut().collect();
    while let Some(value) = pending.pop() {
        let Value::Object(node) = value else {
            continue;
        };
        f(&mut *node);
        if let Some(Value::Array(children)) = node.get_mut("children") {
            pending.extend(children.iter_mut());
        }
    }
}

fn node_type(node: &Map<String, Value>) -> Option<&str> {
    node.get("type").and_then(Value::as_str)
}

/// 4 -> 5: nest the flat parent-pointer list under the reserved roots
///
/// Nodes without a known parent land under Master, which also breaks any
/// parent cycle. Already nested documents pass through untouched.
fn nest_flat_nodes(root: &mut Map<String, Value>, context: &MigrationContext) -> Result<(), DocumentError> {
    let flat = match root.remove("nodes") {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(DocumentError::Migration {
                from: 4,
                reason: format!("expected a node list, found {other}"),
            })
        }
        None => Vec::new(),
    };

    let already_nested = flat.iter().any(|n| n.get("children").is_some());
    if already_nested {
        root.insert("nodes".to_string(), Value::Array(flat));
        return Ok(());
    }

    let now = Value::String(context.now.to_rfc3339());
    let mut order = Vec::new();
    let mut by_id: HashMap<String, Map<String, Value>> = HashMap::new();
    let mut parent_of: HashMap<String, String> = HashMap::new();

    for item in flat {
        let Value::Object(mut node) = item else {
            continue;
        };
        let Some(id) = node.get("id").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        if by_id.contains_key(&id) {
            continue;
        }
        if let Some(parent) = node.remove("parent").and_then(|p| p.as_str().map(str::to_string)) {
            parent_of.insert(id.clone(), parent);
        }
        node.remove("index");
        node.remove("depth");
        for field in ["created", "modified"] {
            node.entry(field).or_insert_with(|| now.clone());
        }
        order.push(id.clone());
        by_id.insert(id, node);
    }

    for reserved in [NodeId::MASTER, NodeId::TRASH] {
        let node = by_id.entry(reserved.to_string()).or_insert_with(|| {
            let mut node = Map::new();
            node.insert("id".to_string(), json!(reserved));
            node.insert("created".to_string(), now.clone());
            node.insert("modified".to_string(), now.clone());
            node
        });
        node.insert("type".to_string(), json!("directory"));
        node.remove("name");
        parent_of.remove(reserved);
    }

    let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
    for id in &order {
        if let Some(parent) = parent_of.get(id) {
            if by_id.contains_key(parent) && parent != id {
                children_of.entry(parent.clone()).or_default().push(id.clone());
            }
        }
    }

    let mut placed = HashSet::new();
    let mut master_children = Vec::new();
    let mut nest = |id: &str, placed: &mut HashSet<String>| -> Option<Value> {
        build_subtree(id, &mut by_id, &children_of, placed)
    };

    let master_tree = nest(NodeId::MASTER, &mut placed);
    let trash_tree = nest(NodeId::TRASH, &mut placed);
    for id in &order {
        if !placed.contains(id) {
            if let Some(tree) = nest(id, &mut placed) {
                master_children.push(tree);
            }
        }
    }

    let (Some(mut master), Some(trash)) = (master_tree, trash_tree) else {
        return Err(DocumentError::Migration {
            from: 4,
            reason: "reserved roots could not be rebuilt".to_string(),
        });
    };
    if let Some(Value::Array(children)) = master.get_mut("children") {
        children.extend(master_children);
        disambiguate_directory_names(children);
    }

    root.insert("nodes".to_string(), Value::Array(vec![master, trash]));
    Ok(())
}

/// Detach `id` and its unplaced descendants from `by_id` as a nested value
fn build_subtree(
    id: &str,
    by_id: &mut HashMap<String, Map<String, Value>>,
    children_of: &HashMap<String, Vec<String>>,
    placed: &mut HashSet<String>,
) -> Option<Value> {
    if !placed.insert(id.to_string()) {
        return None;
    }
    let mut node = by_id.remove(id)?;
    let mut children: Vec<Value> = children_of
        .get(id)
        .into_iter()
        .flatten()
        .filter_map(|child| build_subtree(child, by_id, children_of, placed))
        .collect();
    disambiguate_directory_names(&mut children);
    node.insert("children".to_string(), Value::Array(children));
    Some(Value::Object(node))
}

/// Suffix sibling directory names that collide case-insensitively with an
/// earlier sibling, as in `Notes (2)`
fn disambiguate_directory_names(children: &mut [Value]) {
    let mut taken: HashSet<String> = children
        .iter()
        .filter(|c| node_type_of(c) == Some("directory"))
        .filter_map(|c| c.get("name").and_then(Value::as_str))
        .map(str::to_lowercase)
        .collect();
    let mut seen = HashSet::new();

    for child in children.iter_mut() {
        if node_type_of(child) != Some("directory") {
            continue;
        }
        let Some(name) = child.get("name").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        if seen.insert(name.to_lowercase()) {
            continue;
        }
        let renamed = (2..)
            .map(|n| format!("{name} ({n})"))
            .find(|candidate| !taken.contains(&candidate.to_lowercase()))
            .unwrap_or_default();
        debug!("Renaming colliding directory '{}' to '{}'", name, renamed);
        taken.insert(renamed.to_lowercase());
        seen.insert(renamed.to_lowercase());
        if let Some(node) = child.as_object_mut() {
            node.insert("name".to_string(), json!(renamed));
        }
    }
}

fn node_type_of(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

/// 8 -> 9: single-value rich text becomes a segment array
fn wrap_rich_text(root: &mut Map<String, Value>, _context: &MigrationContext) -> Result<(), DocumentError> {
    for_each_node(root, &mut |node| {
        if !matches!(node_type(node), Some("text" | "heading" | "quote")) {
            return;
        }
        let wrapped = match node.remove("content") {
            Some(Value::Array(segments)) => Value::Array(segments),
            Some(Value::String(text)) => json!([{ "text": text }]),
            Some(Value::Object(segment)) => Value::Array(vec![Value::Object(segment)]),
            _ => json!([]),
        };
        node.insert("content".to_string(), wrapped);
    });
    Ok(())
}

/// 9 -> 10: anchors move `image`/`fetched` to `fileID`/`contentAccessed` and
/// gain `contentModified`
fn rename_anchor_fields(root: &mut Map<String, Value>, context: &MigrationContext) -> Result<(), DocumentError> {
    let now = Value::String(context.now.to_rfc3339());
    for_each_node(root, &mut |node| {
        if node_type(node) != Some("anchor") {
            return;
        }
        if let Some(image) = node.remove("image") {
            if !image.is_null() && !node.contains_key("fileID") {
                node.insert("fileID".to_string(), image);
            }
        }
        if let Some(fetched) = node.remove("fetched") {
            node.entry("contentAccessed").or_insert(fetched);
        }
        let fallback = node.get("modified").cloned().unwrap_or_else(|| now.clone());
        let accessed = node
            .entry("contentAccessed")
            .or_insert_with(|| fallback.clone())
            .clone();
        node.entry("contentModified").or_insert(accessed);
    });
    Ok(())
}

/// 10 -> 11: files get `accessed` from `modified`; tags get a color
fn default_file_and_tag_fields(
    root: &mut Map<String, Value>,
    context: &MigrationContext,
) -> Result<(), DocumentError> {
    let now = Value::String(context.now.to_rfc3339());
    if let Some(Value::Array(files)) = root.get_mut("files") {
        for file in files.iter_mut().filter_map(Value::as_object_mut) {
            let modified = file.entry("modified").or_insert_with(|| now.clone()).clone();
            file.entry("accessed").or_insert(modified);
        }
    }
    if let Some(Value::Array(tags)) = root.get_mut("tags") {
        for tag in tags.iter_mut().filter_map(Value::as_object_mut) {
            tag.entry("color").or_insert_with(|| json!(DEFAULT_TAG_COLOR));
        }
    }
    Ok(())
}
