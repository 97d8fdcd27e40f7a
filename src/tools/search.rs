//! Search tools: regex search over file contents and glob matching of paths.

use std::path::Path;

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use regex::RegexBuilder;
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::{resolve_path, SideEffectClass, Tool};

const MAX_MATCHES: usize = 100;
const MAX_LINE_CHARS: usize = 300;
const MAX_GLOB_RESULTS: usize = 500;

/// Search file contents with a regex.
pub struct Grep;

#[async_trait]
impl Tool for Grep {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for a regex pattern in file contents. Returns matching lines with file paths and line numbers. Use for finding definitions, usages, or specific code patterns."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory or file to search, relative to the workspace. Defaults to the workspace root."
                },
                "file_pattern": {
                    "type": "string",
                    "description": "Optional glob restricting which files are searched (e.g., '*.rs', '*.{rs,py}', 'src/**/*.rs'). Patterns without '/' match file names."
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Whether search is case-sensitive (default: false)"
                }
            },
            "required": ["pattern"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::ReadOnly
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<Value> {
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'pattern' argument"))?;
        let path = args["path"].as_str().unwrap_or(".");
        let filter = args["file_pattern"]
            .as_str()
            .map(FileFilter::new)
            .transpose()?;
        let case_sensitive = args["case_sensitive"].as_bool().unwrap_or(false);

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid pattern: {}", e))?;

        let root = resolve_path(workspace, path);
        if !root.exists() {
            anyhow::bail!("Path '{}' does not exist", path);
        }
        let workspace = workspace.to_path_buf();

        // Directory walks block; keep them off the async workers.
        tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            let mut truncated = false;

            let files = WalkDir::new(&root)
                .into_iter()
                .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file());

            'files: for entry in files {
                if let Some(filter) = &filter {
                    if !filter.matches(&entry, &root) {
                        continue;
                    }
                }
                // Binary or unreadable files are skipped.
                let Ok(contents) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                let display = entry
                    .path()
                    .strip_prefix(&workspace)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .into_owned();

                for (index, line) in contents.lines().enumerate() {
                    if !regex.is_match(line) {
                        continue;
                    }
                    if matches.len() == MAX_MATCHES {
                        truncated = true;
                        break 'files;
                    }
                    matches.push(json!({
                        "path": &display,
                        "line": index + 1,
                        "text": line.chars().take(MAX_LINE_CHARS).collect::<String>(),
                    }));
                }
            }

            Ok::<_, anyhow::Error>(json!({ "matches": matches, "truncated": truncated }))
        })
        .await?
    }
}

/// Find files and directories whose workspace-relative path matches a glob.
pub struct FindFiles;

#[async_trait]
impl Tool for FindFiles {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files and directories matching a glob pattern (e.g., 'src/**/*.rs', '*.{toml,md}'). Paths are relative to the workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern matched against workspace-relative paths"
                }
            },
            "required": ["pattern"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::ReadOnly
    }

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<Value> {
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'pattern' argument"))?;
        let matcher = compile_glob(pattern)?;
        let workspace = workspace.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut matches: Vec<String> = WalkDir::new(&workspace)
                .min_depth(1)
                .into_iter()
                .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
                .filter_map(Result::ok)
                .filter_map(|entry| {
                    let relative = entry.path().strip_prefix(&workspace).ok()?;
                    matcher
                        .is_match(relative)
                        .then(|| relative.to_string_lossy().into_owned())
                })
                .collect();
            matches.sort();

            let truncated = matches.len() > MAX_GLOB_RESULTS;
            matches.truncate(MAX_GLOB_RESULTS);
            Ok::<_, anyhow::Error>(json!({ "matches": matches, "truncated": truncated }))
        })
        .await?
    }
}

/// `file_pattern` filter for [`Grep`].
///
/// A pattern without `/` matches the file name, like `rg -g`. Anything else
/// matches the path relative to the search root.
struct FileFilter {
    matcher: GlobMatcher,
    by_name: bool,
}

impl FileFilter {
    fn new(pattern: &str) -> anyhow::Result<Self> {
        Ok(Self {
            matcher: compile_glob(pattern)?,
            by_name: !pattern.contains('/'),
        })
    }

    fn matches(&self, entry: &walkdir::DirEntry, root: &Path) -> bool {
        if self.by_name {
            return self.matcher.is_match(entry.file_name());
        }
        entry
            .path()
            .strip_prefix(root)
            .map(|relative| self.matcher.is_match(relative))
            .unwrap_or(false)
    }
}

/// `*` stays within one path component; `**` crosses directories.
fn compile_glob(pattern: &str) -> anyhow::Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid glob pattern '{}': {}", pattern, e))?;
    Ok(glob.compile_matcher())
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    name.len() > 1 && name.starts_with('.') && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        std::fs::write(dir.path().join("src/lib.rs"), "fn alpha() {}\nfn Beta() {}\n").expect("write");
        std::fs::write(dir.path().join("notes.md"), "alpha notes\n").expect("write");
        std::fs::create_dir_all(dir.path().join(".git")).expect("mkdir");
        std::fs::write(dir.path().join(".git/config"), "alpha\n").expect("write");
        dir
    }

    #[tokio::test]
    async fn finds_matches_with_line_numbers() {
        let dir = fixture();
        let result = Grep
            .execute(json!({ "pattern": "beta" }), dir.path())
            .await
            .expect("search runs");

        assert_eq!(
            result["matches"],
            json!([{ "path": "src/lib.rs", "line": 2, "text": "fn Beta() {}" }])
        );
        assert_eq!(result["truncated"], false);
    }

    #[tokio::test]
    async fn respects_case_and_suffix_filters() {
        let dir = fixture();
        let result = Grep
            .execute(
                json!({ "pattern": "alpha", "file_pattern": "*.rs", "case_sensitive": true }),
                dir.path(),
            )
            .await
            .expect("search runs");

        let matches = result["matches"].as_array().expect("matches array");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["path"], "src/lib.rs");
    }

    #[tokio::test]
    async fn file_pattern_is_a_glob() {
        let dir = fixture();
        std::fs::write(dir.path().join("main.py"), "alpha = 1\n").expect("write");

        let cases = [
            ("*.{rs,py}", vec!["main.py", "src/lib.rs"]),
            ("lib.*", vec!["src/lib.rs"]),
            ("src/*.rs", vec!["src/lib.rs"]),
            ("*.go", vec![]),
        ];
        for (file_pattern, expected) in cases {
            let result = Grep
                .execute(
                    json!({ "pattern": "alpha", "file_pattern": file_pattern }),
                    dir.path(),
                )
                .await
                .expect("search runs");
            let mut paths: Vec<&str> = result["matches"]
                .as_array()
                .expect("matches array")
                .iter()
                .filter_map(|m| m["path"].as_str())
                .collect();
            paths.sort();
            assert_eq!(paths, expected, "file_pattern {}", file_pattern);
        }
    }

    #[tokio::test]
    async fn invalid_file_pattern_is_an_error() {
        let dir = fixture();
        let err = Grep
            .execute(json!({ "pattern": "alpha", "file_pattern": "src/[" }), dir.path())
            .await
            .expect_err("bad glob");
        assert!(err.to_string().contains("Invalid glob pattern"));
    }

    #[tokio::test]
    async fn glob_matches_relative_paths_and_skips_hidden_entries() {
        let dir = fixture();
        std::fs::create_dir_all(dir.path().join("src/nested")).expect("mkdir");
        std::fs::write(dir.path().join("src/nested/mod.rs"), "").expect("write");

        let result = FindFiles
            .execute(json!({ "pattern": "src/**/*.rs" }), dir.path())
            .await
            .expect("glob runs");
        assert_eq!(result["matches"], json!(["src/lib.rs", "src/nested/mod.rs"]));
        assert_eq!(result["truncated"], false);

        let top_level = FindFiles
            .execute(json!({ "pattern": "*" }), dir.path())
            .await
            .expect("glob runs");
        assert_eq!(top_level["matches"], json!(["notes.md", "src"]));
    }

    #[tokio::test]
    async fn skips_hidden_directories() {
        let dir = fixture();
        let result = Grep
            .execute(json!({ "pattern": "alpha" }), dir.path())
            .await
            .expect("search runs");

        let paths: Vec<&str> = result["matches"]
            .as_array()
            .expect("matches array")
            .iter()
            .filter_map(|m| m["path"].as_str())
            .collect();
        assert!(!paths.iter().any(|p| p.starts_with(".git")));
        assert_eq!(paths.len(), 2);
    }

    #[tokio::test]
    async fn invalid_regex_is_an_error() {
        let dir = fixture();
        let err = Grep
            .execute(json!({ "pattern": "(" }), dir.path())
            .await
            .expect_err("bad regex");
        assert!(err.to_string().contains("Invalid pattern"));
    }
}
