// agent/editor.rs
// The str_replace_editor tool. Two-root scope invariant: everything under the
// documentation directory is writable, the repository root is view-only, and
// nothing outside either is reachable. Paths are canonicalized before any
// check so traversal and symlink escapes land outside the permitted roots.

use crate::agent::context::AgentContext;
use crate::agent::mermaid;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct EditorArgs {
    pub command: String,
    pub path: String,
    #[serde(default)]
    pub file_text: Option<String>,
    #[serde(default)]
    pub old_str: Option<String>,
    #[serde(default)]
    pub new_str: Option<String>,
    #[serde(default)]
    pub insert_line: Option<usize>,
    #[serde(default)]
    pub view_range: Option<Vec<i64>>,
}

#[derive(Debug, PartialEq, Eq)]
enum Scope {
    /// Under the docs directory: every command permitted.
    Docs,
    /// Under the repository root: only `view`.
    RepoReadOnly,
}

/// Run one editor command. `Err` is a tool-result error reported back to the
/// agent, never a run failure.
pub fn run(ctx: &AgentContext, args: EditorArgs) -> Result<String, String> {
    let raw = PathBuf::from(&args.path);
    if !raw.is_absolute() {
        return Err(format!(
            "path must be absolute, got '{}'. The documentation directory is {}",
            args.path,
            ctx.docs_dir.display()
        ));
    }

    match args.command.as_str() {
        "view" => {
            let (path, _) = resolve(ctx, &raw, false)?;
            view(&path, args.view_range.as_deref())
        }
        "create" => {
            let (path, scope) = resolve(ctx, &raw, true)?;
            require_writable(&scope, "create")?;
            create(ctx, &path, args.file_text.as_deref())
        }
        "str_replace" => {
            let (path, scope) = resolve(ctx, &raw, false)?;
            require_writable(&scope, "str_replace")?;
            str_replace(ctx, &path, args.old_str.as_deref(), args.new_str.as_deref())
        }
        "insert" => {
            let (path, scope) = resolve(ctx, &raw, false)?;
            require_writable(&scope, "insert")?;
            insert(ctx, &path, args.insert_line, args.new_str.as_deref())
        }
        "undo_edit" => {
            let (path, scope) = resolve(ctx, &raw, false)?;
            require_writable(&scope, "undo_edit")?;
            undo_edit(ctx, &path)
        }
        other => Err(format!(
            "unknown command '{}'; expected view, create, str_replace, insert, or undo_edit",
            other
        )),
    }
}

fn require_writable(scope: &Scope, command: &str) -> Result<(), String> {
    match scope {
        Scope::Docs => Ok(()),
        Scope::RepoReadOnly => Err(format!(
            "'{}' is not permitted under the repository root; the repository is read-only \
             (only 'view' is allowed there). Write documentation under the output directory.",
            command
        )),
    }
}

/// Canonicalize and classify a path. For `create`, the parent is
/// canonicalized instead (the file itself does not exist yet).
fn resolve(ctx: &AgentContext, raw: &Path, for_create: bool) -> Result<(PathBuf, Scope), String> {
    let canonical = if for_create {
        if raw.exists() {
            // scope still needs deciding; fall through to normal resolution
            fs::canonicalize(raw).map_err(|e| format!("cannot resolve '{}': {}", raw.display(), e))?
        } else {
            let parent = raw
                .parent()
                .ok_or_else(|| format!("path '{}' has no parent directory", raw.display()))?;
            let name = raw
                .file_name()
                .ok_or_else(|| format!("path '{}' has no file name", raw.display()))?;
            let canonical_parent = fs::canonicalize(parent)
                .map_err(|e| format!("cannot resolve '{}': {}", parent.display(), e))?;
            canonical_parent.join(name)
        }
    } else {
        fs::canonicalize(raw).map_err(|e| format!("cannot resolve '{}': {}", raw.display(), e))?
    };

    let docs = fs::canonicalize(&ctx.docs_dir).unwrap_or_else(|_| ctx.docs_dir.clone());
    let repo = fs::canonicalize(&ctx.repo_root).unwrap_or_else(|_| ctx.repo_root.clone());

    if canonical.starts_with(&docs) {
        return Ok((canonical, Scope::Docs));
    }
    if canonical.starts_with(&repo) {
        return Ok((canonical, Scope::RepoReadOnly));
    }
    Err(format!(
        "path '{}' is outside the permitted roots (repository: {}, documentation: {})",
        canonical.display(),
        repo.display(),
        docs.display()
    ))
}

fn view(path: &Path, range: Option<&[i64]>) -> Result<String, String> {
    if path.is_dir() {
        let mut entries: Vec<String> = fs::read_dir(path)
            .map_err(|e| format!("cannot list '{}': {}", path.display(), e))?
            .flatten()
            .map(|e| {
                let mut name = e.file_name().to_string_lossy().to_string();
                if e.path().is_dir() {
                    name.push('/');
                }
                name
            })
            .collect();
        entries.sort();
        return Ok(format!(
            "Directory listing of {}:\n{}",
            path.display(),
            entries.join("\n")
        ));
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = match range {
        Some([start, end]) => {
            let start = (*start).max(1) as usize;
            let end = if *end < 0 { lines.len() } else { (*end as usize).min(lines.len()) };
            if start > lines.len() {
                return Err(format!(
                    "view_range start {} is past the end of the file ({} lines)",
                    start,
                    lines.len()
                ));
            }
            if end < start {
                return Err(format!(
                    "view_range end {} is before start {}",
                    end, start
                ));
            }
            (start, end)
        }
        Some(other) => {
            return Err(format!(
                "view_range must be [start, end], got {:?}",
                other
            ))
        }
        None => (1, lines.len()),
    };

    let numbered: Vec<String> = lines[start - 1..end]
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:6}\t{}", start + i, line))
        .collect();
    Ok(numbered.join("\n"))
}

fn create(ctx: &AgentContext, path: &Path, file_text: Option<&str>) -> Result<String, String> {
    let text = file_text.ok_or("'create' requires the file_text argument")?;
    if path.exists() {
        return Err(format!(
            "file '{}' already exists; use str_replace or insert to modify it",
            path.display()
        ));
    }
    write_validated(ctx, path, text, None)?;
    Ok(format!("File created successfully at: {}", path.display()))
}

fn str_replace(
    ctx: &AgentContext,
    path: &Path,
    old_str: Option<&str>,
    new_str: Option<&str>,
) -> Result<String, String> {
    let old = old_str.ok_or("'str_replace' requires the old_str argument")?;
    let new = new_str.unwrap_or("");
    let content =
        fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;

    let occurrences = content.matches(old).count();
    if occurrences == 0 {
        return Err(format!(
            "old_str did not appear verbatim in '{}'",
            path.display()
        ));
    }
    if occurrences > 1 {
        let matching_lines: Vec<String> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains(old.lines().next().unwrap_or(old)))
            .map(|(i, _)| (i + 1).to_string())
            .collect();
        return Err(format!(
            "old_str occurs {} times in '{}' (lines {}); it must occur exactly once. \
             Add surrounding context to make it unique.",
            occurrences,
            path.display(),
            matching_lines.join(", ")
        ));
    }

    let updated = content.replacen(old, new, 1);
    write_validated(ctx, path, &updated, Some(content))?;
    Ok(format!("File {} edited successfully.", path.display()))
}

fn insert(
    ctx: &AgentContext,
    path: &Path,
    insert_line: Option<usize>,
    new_str: Option<&str>,
) -> Result<String, String> {
    let line = insert_line.ok_or("'insert' requires the insert_line argument")?;
    let text = new_str.ok_or("'insert' requires the new_str argument")?;
    let content =
        fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;

    let mut lines: Vec<&str> = content.lines().collect();
    if line > lines.len() {
        return Err(format!(
            "insert_line {} is past the end of the file ({} lines)",
            line,
            lines.len()
        ));
    }
    let inserted: Vec<&str> = text.lines().collect();
    lines.splice(line..line, inserted);
    let mut updated = lines.join("\n");
    if content.ends_with('\n') {
        updated.push('\n');
    }
    write_validated(ctx, path, &updated, Some(content))?;
    Ok(format!(
        "Text inserted after line {} in {}.",
        line,
        path.display()
    ))
}

fn undo_edit(ctx: &AgentContext, path: &Path) -> Result<String, String> {
    let record = {
        let mut history = ctx.history.lock().map_err(|_| "edit history poisoned")?;
        history.pop(&path.to_path_buf())
    };
    match record {
        Some(record) => match record.prior {
            Some(prior) => {
                fs::write(path, prior)
                    .map_err(|e| format!("cannot restore '{}': {}", path.display(), e))?;
                Ok(format!("Last edit to {} undone.", path.display()))
            }
            None => {
                fs::remove_file(path)
                    .map_err(|e| format!("cannot remove '{}': {}", path.display(), e))?;
                Ok(format!("Creation of {} undone.", path.display()))
            }
        },
        None => Err(format!("no edit history for '{}'", path.display())),
    }
}

/// Write the file, record history, and (for Markdown) validate every
/// embedded Mermaid diagram. A diagram failure is reported as a tool-result
/// error so the agent can repair it; the file stays written.
fn write_validated(
    ctx: &AgentContext,
    path: &Path,
    content: &str,
    prior: Option<String>,
) -> Result<(), String> {
    {
        // the lock is held across the write so concurrent edits to one file
        // cannot interleave
        let mut history = ctx.history.lock().map_err(|_| "edit history poisoned")?;
        fs::write(path, content)
            .map_err(|e| format!("cannot write '{}': {}", path.display(), e))?;
        history.push(path.to_path_buf(), prior);
    }

    if path.extension().is_some_and(|e| e == "md") {
        if let Err(diagram_error) = mermaid::validate_markdown(content) {
            return Err(format!(
                "{}. The file was written; repair the diagram with str_replace.",
                diagram_error
            ));
        }
    }
    Ok(())
}

/// JSON schema for the tool, in the wire format.
pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "command": {
                "type": "string",
                "enum": ["view", "create", "str_replace", "insert", "undo_edit"],
                "description": "The editor command to run."
            },
            "path": {
                "type": "string",
                "description": "Absolute path to the file or directory."
            },
            "file_text": {
                "type": "string",
                "description": "Content of the file to create (create only)."
            },
            "old_str": {
                "type": "string",
                "description": "Exact string to replace; must occur exactly once (str_replace only)."
            },
            "new_str": {
                "type": "string",
                "description": "Replacement text (str_replace) or text to insert (insert)."
            },
            "insert_line": {
                "type": "integer",
                "description": "Line number after which to insert; 0 inserts at the top (insert only)."
            },
            "view_range": {
                "type": "array",
                "items": {"type": "integer"},
                "description": "[start, end] 1-based line range; end of -1 means end of file (view only)."
            }
        },
        "required": ["command", "path"]
    })
}
