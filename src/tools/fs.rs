//! File system tools: list, read, write and edit files in the workspace.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{resolve_path, SideEffectClass, Tool};

const DEFAULT_MAX_BYTES: u64 = 10_000;

/// List the entries of a directory.
pub struct ListDir;

#[async_trait]
impl Tool for ListDir {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory with type, size and modification time, similar to `ls -l`."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list, relative to the workspace. Defaults to the workspace root."
                }
            }
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::ReadOnly
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<Value> {
        let path = args["path"].as_str().unwrap_or(".");
        let dir = resolve_path(workspace, path);
        if !dir.is_dir() {
            anyhow::bail!("Path '{}' is not a directory", path);
        }

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Broken symlinks and the like still get listed.
            let entry = match entry.metadata().await {
                Ok(meta) => {
                    let modified_at = meta
                        .modified()
                        .ok()
                        .map(|time| DateTime::<Utc>::from(time).to_rfc3339());
                    json!({
                        "name": name,
                        "type": if meta.is_dir() { "dir" } else { "file" },
                        "size": meta.len(),
                        "modified_at": modified_at,
                    })
                }
                Err(e) => json!({ "name": name, "type": "unknown", "error": e.to_string() }),
            };
            entries.push(entry);
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(json!({ "path": path, "entries": entries }))
    }
}

/// Read a text file.
pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Always read a file before editing it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace"
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Maximum number of bytes to return (default: 10000)"
                }
            },
            "required": ["path"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::ReadOnly
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<Value> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'path' argument"))?;
        let max_bytes = args["max_bytes"].as_u64().unwrap_or(DEFAULT_MAX_BYTES);

        read_text(workspace, path, max_bytes).await
    }
}

/// Read several text files in one call.
pub struct ReadManyFiles;

#[async_trait]
impl Tool for ReadManyFiles {
    fn name(&self) -> &str {
        "read_many_files"
    }

    fn description(&self) -> &str {
        "Read the contents of several files at once. Files that cannot be read get an error entry instead of failing the whole call."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "array",
                    "description": "File paths relative to the workspace",
                    "items": { "type": "string" }
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Maximum number of bytes to return per file (default: 10000)"
                }
            },
            "required": ["paths"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::ReadOnly
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<Value> {
        let paths = args["paths"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Missing 'paths' argument"))?;
        let max_bytes = args["max_bytes"].as_u64().unwrap_or(DEFAULT_MAX_BYTES);

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let entry = match path.as_str() {
                Some(path) => match read_text(workspace, path, max_bytes).await {
                    Ok(entry) => entry,
                    Err(e) => json!({ "path": path, "error": e.to_string() }),
                },
                None => json!({ "path": path, "error": "Path must be a string" }),
            };
            files.push(entry);
        }

        Ok(json!({ "files": files }))
    }
}

async fn read_text(workspace: &Path, path: &str, max_bytes: u64) -> anyhow::Result<Value> {
    let file = resolve_path(workspace, path);
    let data = tokio::fs::read(&file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", path, e))?;

    let total = data.len();
    let shown = total.min(usize::try_from(max_bytes).unwrap_or(usize::MAX));
    Ok(json!({
        "path": path,
        "contents": String::from_utf8_lossy(&data[..shown]),
        "truncated": shown < total,
    }))
}

/// Create or overwrite a file.
pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write contents to a file, creating parent directories as needed. Overwrites existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace"
                },
                "contents": {
                    "type": "string",
                    "description": "Full contents to write"
                }
            },
            "required": ["path", "contents"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Mutating
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<Value> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'path' argument"))?;
        let contents = args["contents"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'contents' argument"))?;

        let file = resolve_path(workspace, path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let existed = file.exists();
        tokio::fs::write(&file, contents)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write '{}': {}", path, e))?;

        Ok(json!({
            "path": path,
            "bytes_written": contents.len(),
            "created": !existed,
        }))
    }
}

/// Replace one occurrence of a text span in a file.
pub struct EditFile;

#[async_trait]
impl Tool for EditFile {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace text within a file. `search_text` must match the file exactly, including whitespace, and should include enough surrounding context to be unique. Only the first occurrence is replaced."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace"
                },
                "search_text": {
                    "type": "string",
                    "description": "Exact literal text to replace"
                },
                "replace_text": {
                    "type": "string",
                    "description": "Text to put in place of `search_text`"
                }
            },
            "required": ["path", "search_text", "replace_text"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Mutating
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<Value> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'path' argument"))?;
        let search_text = args["search_text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'search_text' argument"))?;
        let replace_text = args["replace_text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'replace_text' argument"))?;

        if search_text.is_empty() {
            anyhow::bail!("'search_text' must not be empty");
        }

        let file = resolve_path(workspace, path);
        let original = tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", path, e))?;

        let occurrences = original.matches(search_text).count();
        if occurrences == 0 {
            anyhow::bail!("Search text not found in '{}'. Use read_file to see the exact content.", path);
        }

        let updated = original.replacen(search_text, replace_text, 1);
        tokio::fs::write(&file, updated)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write '{}': {}", path, e))?;

        Ok(json!({
            "path": path,
            "occurrences": occurrences,
            "replaced": 1,
        }))
    }
}
