//! Line-oriented terminal frontend for the agent.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use similar::{ChangeTag, TextDiff};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::agent::{
    AgentEvent, AgentUi, ApprovalDecision, ApprovalReply, ApprovalRequest, ToolStatus,
};

const PREVIEW_CHARS: usize = 200;

/// Reads user input and approval answers from stdin and prints agent events
/// to stdout.
pub struct ConsoleUi {
    input: Arc<Mutex<Lines<BufReader<Stdin>>>>,
    /// Streamed assistant text is on the current line.
    mid_line: AtomicBool,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self {
            input: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
            mid_line: AtomicBool::new(false),
        }
    }

    pub fn print_banner(&self, model: &str, auto_approve: bool, exit_command: &str) {
        println!("Dune | model: {}", model);
        if auto_approve {
            println!("Auto-approve is on: tools run without asking.");
        }
        println!("Type '{}' to quit. Ctrl-C cancels the current request.", exit_command);
        println!();
    }

    fn end_line(&self) {
        if self.mid_line.swap(false, Ordering::SeqCst) {
            println!();
        }
    }
}

impl Default for ConsoleUi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentUi for ConsoleUi {
    fn emit(&self, event: AgentEvent) {
        match event {
            AgentEvent::TextDelta { content } => {
                if !self.mid_line.swap(true, Ordering::SeqCst) {
                    print!("Dune: ");
                }
                print!("{}", content);
                let _ = std::io::stdout().flush();
            }
            AgentEvent::ToolCall { name, args, .. } => {
                self.end_line();
                println!("→ {} {}", name, preview(&args.to_string()));
            }
            AgentEvent::ToolResult {
                name,
                status,
                payload,
                ..
            } => {
                self.end_line();
                let mark = if status == ToolStatus::Ok { "✓" } else { "✗" };
                println!("{} {} [{}] {}", mark, name, status, preview(&payload.to_string()));
            }
            AgentEvent::FinalText { .. } => self.end_line(),
            AgentEvent::RoundLimitReached { message, .. } => {
                self.end_line();
                println!("Dune: {}", message);
            }
            AgentEvent::Error { message } => {
                self.end_line();
                println!("Error: {}", message);
            }
            AgentEvent::TurnCancelled => {
                self.end_line();
                println!("Request cancelled.");
            }
        }
    }

    fn request_approval(&self, request: ApprovalRequest, reply: ApprovalReply) {
        self.end_line();
        match change_preview(&request) {
            Some(diff) => {
                println!(
                    "Dune wants to run {} ({}):",
                    request.tool_name, request.side_effect_class
                );
                print!("{}", diff);
            }
            None => println!(
                "Dune wants to run {} ({}) with {}",
                request.tool_name,
                request.side_effect_class,
                preview(&request.arguments.to_string())
            ),
        }
        print!("Approve this tool call? [y/N] ");
        let _ = std::io::stdout().flush();

        let input = Arc::clone(&self.input);
        tokio::spawn(async move {
            let mut reply = reply;
            let mut lines = input.lock().await;
            let decision = tokio::select! {
                // The gate stopped waiting (turn cancelled).
                _ = reply.closed() => return,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => parse_decision(&line),
                    Ok(None) => ApprovalDecision::Deny,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read approval answer");
                        ApprovalDecision::Deny
                    }
                },
            };
            let _ = reply.send(decision);
        });
    }

    async fn next_input(&self) -> Option<String> {
        self.end_line();
        print!("You: ");
        let _ = std::io::stdout().flush();

        match self.input.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read user input");
                None
            }
        }
    }
}

/// Anything but an explicit yes is a denial.
fn parse_decision(line: &str) -> ApprovalDecision {
    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => ApprovalDecision::Approve,
        _ => ApprovalDecision::Deny,
    }
}

/// The full change a file-writing call would make, shown untruncated.
fn change_preview(request: &ApprovalRequest) -> Option<String> {
    let args = &request.arguments;
    let path = args["path"].as_str()?;
    let diff = match request.tool_name.as_str() {
        "edit" => line_diff(args["search_text"].as_str()?, args["replace_text"].as_str()?),
        "write_file" => line_diff("", args["contents"].as_str()?),
        _ => return None,
    };
    Some(format!("--- {}\n{}", path, diff))
}

fn line_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "- ",
            ChangeTag::Insert => "+ ",
            ChangeTag::Equal => "  ",
        };
        output.push_str(sign);
        output.push_str(change.value());
        if change.missing_newline() {
            output.push('\n');
        }
    }
    output
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}... [truncated]", cut)
}
