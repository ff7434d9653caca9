//! Node command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use arbor_core::{LibraryResult, NodeId, Removal, Store, TextKind, TreeNode};

use super::resolve_node;
use crate::output::{summarize, NodeDetails, NodeRow, Output};

fn row(entry: &TreeNode, base_depth: usize) -> NodeRow {
    NodeRow {
        id: entry.id().to_string(),
        depth: entry.depth() - base_depth,
        kind: entry.content().kind().as_str(),
        summary: summarize(entry.id(), entry.content()),
    }
}

/// Print the whole forest, or the subtree under `root`
pub fn tree(store: &Store, root: Option<String>, output: &Output) -> Result<()> {
    let root = root.map(|r| resolve_node(store, &r)).transpose()?;

    let rows = store.read(|lib| -> LibraryResult<Vec<NodeRow>> {
        match &root {
            Some(id) => {
                let base_depth = lib.get_node(id)?.depth();
                Ok(lib.visit_from(id)?.map(|n| row(n, base_depth)).collect())
            }
            None => Ok(lib.visit().map(|n| row(n, 0)).collect()),
        }
    })??;

    output.print_tree(&rows);
    Ok(())
}

/// Show a single node
pub fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = resolve_node(store, &id)?;

    let details = store.read(|lib| -> LibraryResult<NodeDetails> {
        let entry = lib.get_node(&id)?;
        let tags = entry
            .node()
            .tags
            .iter()
            .map(|t| {
                lib.get_tag(t)
                    .map(|tag| tag.name.clone())
                    .unwrap_or_else(|| t.to_string())
            })
            .collect();
        Ok(NodeDetails {
            node: entry.node().clone(),
            path: lib.get_path(&id)?,
            parent: entry.parent().cloned(),
            children: entry.children().len(),
            tags,
        })
    })??;

    output.print_node(&details);
    Ok(())
}

/// Add a Text, Heading or Quote node
pub fn add_text(
    store: &Store,
    parent: String,
    kind: TextKind,
    text: String,
    output: &Output,
) -> Result<()> {
    let parent = resolve_node(store, &parent)?;
    let id = match kind {
        TextKind::Text => store.add_text_node(&parent, text)?,
        TextKind::Heading => store.add_heading_node(&parent, text)?,
        TextKind::Quote => store.add_quote_node(&parent, text)?,
    };
    let label = match kind {
        TextKind::Text => "text",
        TextKind::Heading => "heading",
        TextKind::Quote => "quote",
    };
    output.print_created(label, &id);
    Ok(())
}

pub fn add_math(store: &Store, parent: String, expression: String, output: &Output) -> Result<()> {
    let parent = resolve_node(store, &parent)?;
    let id = store.add_math_node(&parent, &expression)?;
    output.print_created("math", &id);
    Ok(())
}

/// Create every missing directory along `path`
pub fn add_dir(store: &Store, path: String, output: &Output) -> Result<()> {
    let id = store.create_directory(&path)?;
    output.print_created("directory", &id);
    Ok(())
}

pub async fn add_image(
    store: &Store,
    parent: String,
    path: PathBuf,
    output: &Output,
) -> Result<()> {
    let parent = resolve_node(store, &parent)?;
    let id = store
        .add_image_from_path(&parent, &path)
        .await
        .with_context(|| format!("Failed to add image {:?}", path))?;
    output.print_created("image", &id);
    Ok(())
}

/// Add an anchor; its preview comes from the store's preview source
pub async fn add_anchor(store: &Store, parent: String, url: String, output: &Output) -> Result<()> {
    let parent = resolve_node(store, &parent)?;
    let id = store.add_anchor_from_url(&parent, &url).await?;
    output.print_created("anchor", &id);
    Ok(())
}

/// Move a node under `parent`, before `before` or at the end
pub fn mv(
    store: &Store,
    id: String,
    parent: String,
    before: Option<String>,
    output: &Output,
) -> Result<()> {
    let id = resolve_node(store, &id)?;
    let parent = resolve_node(store, &parent)?;
    let before = before.map(|b| resolve_node(store, &b)).transpose()?;

    store.move_node_before(&id, &parent, before.as_ref())?;
    output.success(&format!("Moved {} under {}", id, parent));
    Ok(())
}

pub fn swap(store: &Store, a: String, b: String, output: &Output) -> Result<()> {
    let a = resolve_node(store, &a)?;
    let b = resolve_node(store, &b)?;
    store.swap_index(&a, &b)?;
    output.success(&format!("Swapped {} and {}", a, b));
    Ok(())
}

pub fn indent(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = resolve_node(store, &id)?;
    store.indent_node(&id)?;
    output.success(&format!("Indented {}", id));
    Ok(())
}

pub fn outdent(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = resolve_node(store, &id)?;
    store.outdent_node(&id)?;
    output.success(&format!("Outdented {}", id));
    Ok(())
}

/// Switch a node between text, heading and quote
pub fn retype(store: &Store, id: String, kind: TextKind, output: &Output) -> Result<()> {
    let id = resolve_node(store, &id)?;
    store.retype_node(&id, kind)?;
    output.success(&format!("Retyped {}", id));
    Ok(())
}

/// Permanently remove a node and its subtree
pub async fn rm(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = resolve_node(store, &id)?;
    let removal = store.remove_node(&id).await?;
    report_removal(&removal, output);
    Ok(())
}

pub fn trash(store: &Store, id: String, output: &Output) -> Result<()> {
    let id = resolve_node(store, &id)?;
    store.trash_node(&id)?;
    output.success(&format!("Moved {} to Trash", id));
    Ok(())
}

pub async fn empty_trash(store: &Store, output: &Output) -> Result<()> {
    let removal = store.empty_trash().await?;
    if removal.nodes.is_empty() {
        output.message("Trash is already empty.");
        return Ok(());
    }
    report_removal(&removal, output);
    Ok(())
}

fn report_removal(removal: &Removal, output: &Output) {
    output.success(&format!(
        "Removed {} node(s) and {} file(s)",
        removal.nodes.len(),
        removal.files.len()
    ));
}

/// Print the path of a node
pub fn path(store: &Store, id: String, output: &Output) -> Result<()> {
    let id: NodeId = resolve_node(store, &id)?;
    let path = store.read(|lib| lib.get_path(&id))??;
    if output.is_json() {
        println!("{}", serde_json::json!({"id": id, "path": path}));
    } else {
        println!("{}", path);
    }
    Ok(())
}
