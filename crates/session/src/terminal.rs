use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use coursechat_history::{Message, Role};
use snafu::{OptionExt, ResultExt};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{
    ChatSurface, CodeBlockInfo, GradeReport, RenderedContent, SessionController, SubmitOutcome,
};
use crate::error::{MissingIdentitySnafu, ReadInputSnafu, SessionResult};

pub const USER_ID_ENV: &str = "COURSECHAT_USER_ID";
pub const BLOCK_ID_ENV: &str = "COURSECHAT_BLOCK_ID";

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    Send(String),
    Report { index: usize, reason: String },
    Grade,
    Quit,
    Help,
    Invalid(String),
}

impl TerminalCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));
        let parsed = match name {
            "quit" | "exit" => Self::Quit,
            "grade" => Self::Grade,
            "help" => Self::Help,
            "report" => {
                let (index, reason) = rest
                    .split_once(char::is_whitespace)
                    .map(|(index, reason)| (index, reason.trim()))
                    .unwrap_or((rest, ""));
                match index.parse::<usize>() {
                    Ok(index) if !reason.is_empty() => Self::Report {
                        index,
                        reason: reason.to_string(),
                    },
                    _ => Self::Invalid("usage: /report <index> <reason>".to_string()),
                }
            }
            other => Self::Invalid(format!("unknown command `/{other}`")),
        };
        Some(parsed)
    }
}

pub const HELP_TEXT: &str = "commands: /report <index> <reason>, /grade, /help, /quit";

/// Picks an identity value from the command line, then the environment.
pub fn identity_value(
    arg: Option<String>,
    env_var: &'static str,
    name: &'static str,
) -> SessionResult<String> {
    arg.or_else(|| std::env::var(env_var).ok())
        .filter(|value| !value.trim().is_empty())
        .context(MissingIdentitySnafu {
            stage: "read-identity",
            name,
            env_var,
        })
}

/// Reads stdin line by line until `/quit` or end of input.
///
/// A submitted message is driven to completion before the next line is read.
pub async fn run(
    controller: &mut SessionController,
    surface: Arc<dyn ChatSurface>,
) -> SessionResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
        stage: "terminal-next-line",
    })? {
        let Some(command) = TerminalCommand::parse(&line) else {
            continue;
        };

        match command {
            TerminalCommand::Send(text) => match controller.submit(&text) {
                SubmitOutcome::Accepted(_) => {
                    controller.drive_turn().await;
                }
                SubmitOutcome::Ignored(reason) => {
                    surface.show_alert(&format!("message not sent: {reason:?}"));
                }
            },
            TerminalCommand::Report { index, reason } => {
                match controller.report_message(index, &reason) {
                    Ok(task) => {
                        if task.await.is_err() {
                            tracing::warn!("report task panicked");
                        }
                    }
                    Err(error) => surface.show_alert(&error.to_string()),
                }
            }
            TerminalCommand::Grade => match controller.request_grading() {
                Ok(task) => {
                    if task.await.is_err() {
                        tracing::warn!("grading task panicked");
                    }
                }
                Err(error) => surface.show_alert(&error.to_string()),
            },
            TerminalCommand::Help => surface.show_alert(HELP_TEXT),
            TerminalCommand::Invalid(message) => surface.show_alert(&message),
            TerminalCommand::Quit => break,
        }
    }

    Ok(())
}

/// Line-oriented surface: streamed text is printed as it grows.
///
/// Rendered HTML is ignored here; the markdown source reads fine in a terminal.
#[derive(Default)]
pub struct TerminalSurface {
    printed: Mutex<HashMap<usize, String>>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(error) = stdout
            .write_all(text.as_bytes())
            .and_then(|()| stdout.flush())
        {
            tracing::warn!(error = %error, "failed to write to terminal");
        }
    }
}

fn speaker(message: &Message) -> String {
    match (message.role, message.index) {
        (Role::Assistant, Some(index)) => format!("[{index}] tutor"),
        (Role::Assistant, None) => "tutor".to_string(),
        (Role::User, _) => "you".to_string(),
    }
}

/// Text to print so the screen shows `next` after `shown`.
fn continuation(shown: &str, next: &str) -> String {
    match next.strip_prefix(shown) {
        Some(delta) => delta.to_string(),
        None => format!("\n{next}"),
    }
}

impl ChatSurface for TerminalSurface {
    fn append_message(&self, position: usize, message: &Message, content: &RenderedContent) {
        let text = content.source_text();
        self.emit(&format!("\n{}: {text}", speaker(message)));
        if let Ok(mut printed) = self.printed.lock() {
            printed.insert(position, text.to_string());
        }
    }

    fn update_message(&self, position: usize, content: &RenderedContent) {
        let next = content.source_text();
        let delta = match self.printed.lock() {
            Ok(mut printed) => {
                let shown = printed.entry(position).or_default();
                let delta = continuation(shown, next);
                next.clone_into(shown);
                delta
            }
            Err(_) => format!("\n{next}"),
        };
        self.emit(&delta);
    }

    fn set_input_enabled(&self, enabled: bool) {
        if enabled {
            self.emit("\n> ");
        }
    }

    fn attach_code_block_actions(&self, _position: usize, code_blocks: &[CodeBlockInfo]) {
        let languages = code_blocks
            .iter()
            .map(|block| block.language.as_deref().unwrap_or("text"))
            .collect::<Vec<_>>()
            .join(", ");
        self.emit(&format!(
            "\n  ({} code block(s): {languages})",
            code_blocks.len()
        ));
    }

    fn show_alert(&self, text: &str) {
        self.emit(&format!("\n! {text}\n"));
    }

    fn show_grade(&self, grade: &GradeReport) {
        let score = grade
            .score
            .map(|score| format!("{score}"))
            .unwrap_or_else(|| "pending".to_string());
        let feedback = grade.feedback.as_deref().unwrap_or("");
        self.emit(&format!("\n* grade: {score} {feedback}\n"));
    }
}
