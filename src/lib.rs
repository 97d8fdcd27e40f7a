//! # Dune
//!
//! An interactive coding assistant for the terminal.
//!
//! This library provides:
//! - A tool-based agent loop with an approval gate for mutating tools
//! - A registry of workspace tools with schema-checked arguments
//! - A streaming client for OpenAI-compatible chat completion APIs
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Read a request from the user
//! 2. Stream a completion with the available tools
//! 3. Gate, execute and record any tool calls the model makes
//! 4. Feed results back to the model, repeat until it answers
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dune::{agent::{Agent, Session, TurnCanceller}, config::Config};
//! use dune::{console::ConsoleUi, llm::OpenAiCompatClient, tools::ToolRegistry};
//!
//! let config = Config::from_env()?;
//! let registry = Arc::new(ToolRegistry::with_builtin_tools(&config.workspace_path)?);
//! let client = Arc::new(OpenAiCompatClient::new(&config.base_url, &config.api_key));
//! let mut session = Session::new(config.approval_mode());
//! let agent = Agent::new(config, client, registry, Arc::new(ConsoleUi::new()));
//! agent.run(&mut session, &TurnCanceller::new()).await?;
//! ```

pub mod agent;
pub mod config;
pub mod console;
pub mod llm;
pub mod tools;

pub use config::Config;
