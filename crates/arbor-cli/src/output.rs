//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use arbor_core::{File, Node, NodeContent, NodeId, Tag, TRASH_LABEL};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// One line of a tree listing
#[derive(Debug, Clone, Serialize)]
pub struct NodeRow {
    pub id: String,
    pub depth: usize,
    pub kind: &'static str,
    pub summary: String,
}

/// A tag with the number of nodes carrying it
#[derive(Debug, Clone, Serialize)]
pub struct TagUsage {
    #[serde(flatten)]
    pub tag: Tag,
    pub count: usize,
}

/// A file with the number of nodes referencing it
#[derive(Debug, Clone, Serialize)]
pub struct FileUsage {
    #[serde(flatten)]
    pub file: File,
    pub references: usize,
}

/// Everything `show` prints about a node
#[derive(Debug, Clone, Serialize)]
pub struct NodeDetails {
    pub node: Node,
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: usize,
    pub tags: Vec<String>,
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a tree listing, indented by depth
    pub fn print_tree(&self, rows: &[NodeRow]) {
        match self.format {
            OutputFormat::Human => {
                for row in rows {
                    println!(
                        "{}{} {} | {}",
                        "  ".repeat(row.depth),
                        short_id(&row.id),
                        row.kind,
                        truncate_line(&row.summary, 60)
                    );
                }
            }
            OutputFormat::Json => print_json(rows),
            OutputFormat::Quiet => {
                for row in rows {
                    println!("{}", row.id);
                }
            }
        }
    }

    /// Print a single node
    pub fn print_node(&self, details: &NodeDetails) {
        let node = &details.node;
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", node.id);
                println!("Kind:     {}", node.kind());
                println!("Path:     {}", details.path);
                if let Some(ref parent) = details.parent {
                    println!("Parent:   {}", parent);
                }
                println!("Children: {}", details.children);
                if !details.tags.is_empty() {
                    println!("Tags:     {}", details.tags.join(", "));
                }
                println!("Created:  {}", node.created.as_datetime().format("%Y-%m-%d %H:%M"));
                println!("Modified: {}", node.modified.as_datetime().format("%Y-%m-%d %H:%M"));

                let body = describe(&node.id, &node.content);
                if !body.is_empty() {
                    println!();
                    println!("{}", body);
                }
            }
            OutputFormat::Json => print_json(details),
            OutputFormat::Quiet => println!("{}", node.id),
        }
    }

    /// Report a freshly created node
    pub fn print_created(&self, kind: &str, id: &NodeId) {
        match self.format {
            OutputFormat::Human => println!("✓ Created {} {}", kind, id),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"status": "success", "id": id}));
            }
            OutputFormat::Quiet => println!("{}", id),
        }
    }

    /// Print a list of tags
    pub fn print_tags(&self, tags: &[TagUsage]) {
        match self.format {
            OutputFormat::Human => {
                if tags.is_empty() {
                    println!("No tags found.");
                    return;
                }
                for usage in tags {
                    println!("{} {} ({})", usage.tag.color, usage.tag.name, usage.count);
                }
                println!("\n{} tag(s)", tags.len());
            }
            OutputFormat::Json => print_json(tags),
            OutputFormat::Quiet => {
                for usage in tags {
                    println!("{}", usage.tag.name);
                }
            }
        }
    }

    /// Print the file registry
    pub fn print_files(&self, files: &[FileUsage]) {
        match self.format {
            OutputFormat::Human => {
                if files.is_empty() {
                    println!("No files stored.");
                    return;
                }
                for usage in files {
                    println!(
                        "{} | {} | {} | {} ref(s)",
                        short_id(usage.file.id.as_str()),
                        usage.file.mime_type,
                        truncate(usage.file.name.as_deref().unwrap_or("-"), 30),
                        usage.references
                    );
                }
                println!("\n{} file(s)", files.len());
            }
            OutputFormat::Json => print_json(files),
            OutputFormat::Quiet => {
                for usage in files {
                    println!("{}", usage.file.id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render JSON: {}", e),
    }
}

/// One-line summary of a node's content
pub fn summarize(id: &NodeId, content: &NodeContent) -> String {
    if id.as_str() == NodeId::MASTER {
        return "Master".to_string();
    }
    if id.as_str() == NodeId::TRASH {
        return TRASH_LABEL.to_string();
    }
    match content {
        NodeContent::Text { content }
        | NodeContent::Heading { content }
        | NodeContent::Quote { content } => content.plain_text(),
        NodeContent::Directory { name } => name.clone().unwrap_or_else(|| "(unnamed)".to_string()),
        NodeContent::Math { expression } => expression.clone(),
        NodeContent::Image { file_id } => format!("file {}", file_id),
        NodeContent::TextEmbed { file_id } => format!("embeds file {}", file_id),
        NodeContent::Anchor(preview) => preview.title.clone().unwrap_or_else(|| preview.url.clone()),
        NodeContent::Canvas { file_id, .. } => format!("canvas file {}", file_id),
    }
}

/// Multi-line body shown by `show`
fn describe(id: &NodeId, content: &NodeContent) -> String {
    match content {
        NodeContent::Anchor(preview) => {
            let mut lines = vec![format!("URL:         {}", preview.url)];
            if let Some(ref title) = preview.title {
                lines.push(format!("Title:       {}", title));
            }
            if let Some(ref description) = preview.description {
                lines.push(format!("Description: {}", description));
            }
            if let Some(ref file_id) = preview.file_id {
                lines.push(format!("Preview:     file {}", file_id));
            }
            lines.join("\n")
        }
        NodeContent::Canvas {
            file_id,
            preview_file_id,
        } => format!("Canvas:  file {}\nPreview: file {}", file_id, preview_file_id),
        _ => summarize(id, content),
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
