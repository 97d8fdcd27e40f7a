//! Tool registry: maps tool names to handlers and validates model-supplied
//! arguments against each tool's declared schema.
//!
//! Every tool carries a [`ToolSpec`] (name, description, JSON parameter schema
//! and [`SideEffectClass`]). The registry is built once at startup and is
//! read-only afterwards; the agent shares it behind an `Arc`.

mod fs;
mod schema;
mod search;
mod terminal;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use fs::{EditFile, ListDir, ReadFile, ReadManyFiles, WriteFile};
pub use schema::{SchemaViolation, ViolationKind};
pub use search::{FindFiles, Grep};
pub use terminal::Shell;

/// Whether running a tool can change anything outside the conversation.
///
/// Drives auto-approval: read-only tools never wait for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectClass {
    ReadOnly,
    Mutating,
}

impl fmt::Display for SideEffectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read_only"),
            Self::Mutating => write!(f, "mutating"),
        }
    }
}

/// Declared contract of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
    pub side_effect_class: SideEffectClass,
}

impl ToolSpec {
    fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
            side_effect_class: tool.side_effect_class(),
        }
    }
}

/// A callable tool.
///
/// `execute` receives arguments that already passed [`ToolRegistry::validate`].
/// Failures are returned as errors; the executor turns them into tool results.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    fn side_effect_class(&self) -> SideEffectClass;

    async fn execute(&self, args: Value, workspace: &Path) -> anyhow::Result<Value>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Invalid parameter schema for tool {name}: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),
}

struct RegisteredTool {
    spec: ToolSpec,
    handler: Arc<dyn Tool>,
}

/// Registry of the tools available to the model.
pub struct ToolRegistry {
    workspace: PathBuf,
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry whose tools operate inside `workspace`.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            tools: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Create a registry with the built-in file, search and shell tools.
    pub fn with_builtin_tools(workspace: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let mut registry = Self::new(workspace);
        registry.register(Arc::new(ListDir))?;
        registry.register(Arc::new(ReadFile))?;
        registry.register(Arc::new(ReadManyFiles))?;
        registry.register(Arc::new(FindFiles))?;
        registry.register(Arc::new(Grep))?;
        registry.register(Arc::new(WriteFile))?;
        registry.register(Arc::new(EditFile))?;
        registry.register(Arc::new(Shell))?;
        Ok(registry)
    }

    /// Register a tool under its declared name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let spec = ToolSpec::of(tool.as_ref());
        if self.by_name.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateTool(spec.name));
        }
        schema::check_schema(&spec.parameters).map_err(|reason| RegistryError::InvalidSchema {
            name: spec.name.clone(),
            reason,
        })?;

        tracing::debug!(tool = %spec.name, class = %spec.side_effect_class, "Registered tool");
        self.by_name.insert(spec.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            spec,
            handler: tool,
        });
        Ok(())
    }

    /// Look up the handler for a tool.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.entry(name).map(|entry| Arc::clone(&entry.handler))
    }

    /// Look up the declared spec for a tool.
    pub fn spec(&self, name: &str) -> Result<&ToolSpec, RegistryError> {
        self.entry(name).map(|entry| &entry.spec)
    }

    /// Check `args` against the tool's schema before any handler runs.
    pub fn validate(&self, name: &str, args: &Value) -> Result<&ToolSpec, RegistryError> {
        let spec = self.spec(name)?;
        schema::validate(&spec.name, &spec.parameters, args)?;
        Ok(spec)
    }

    /// All specs, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|entry| entry.spec.clone()).collect()
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&RegisteredTool, RegistryError> {
        self.by_name
            .get(name)
            .map(|&index| &self.tools[index])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }
}

/// Resolve a model-supplied path against the workspace root.
fn resolve_path(workspace: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workspace.join(candidate)
    }
}

/// Cut `text` down to at most `max_len` bytes on a char boundary.
fn truncate_output(text: &mut String, max_len: usize) -> bool {
    if text.len() <= max_len {
        return false;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    true
}
