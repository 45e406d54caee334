use std::borrow::Cow::{self, Borrowed, Owned};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use rustyline::Editor;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use docchat_application::ChatCoordinator;
use docchat_core::config::AssistantSettings;
use docchat_core::knowledge::KeywordKnowledgeResponder;
use docchat_core::message::{Sender, UiEvent, UiSink};
use docchat_interaction::{AssistantStore, OpenAiAssistantStore};

const SLASH_COMMANDS: &[&str] = &["/upload", "/cancel"];

/// Rustyline helper: completes the slash commands and flags unknown ones
/// before the line is submitted. Chat text is left untouched.
struct CliHelper;

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let typed = &line[..pos];
        // Only the command word completes, never its argument.
        if !typed.starts_with('/') || typed.contains(' ') {
            return Ok((0, Vec::new()));
        }
        let candidates = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(typed))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if !line.starts_with('/') {
            return Borrowed(line);
        }
        let command = line.split_whitespace().next().unwrap_or(line);
        if SLASH_COMMANDS.contains(&command) {
            Owned(line.bright_cyan().to_string())
        } else {
            // A typo'd command would otherwise be sent as chat text.
            Owned(line.red().to_string())
        }
    }

    fn highlight_char(&self, line: &str, _pos: usize, _forced: bool) -> bool {
        line.starts_with('/')
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let typed = &line[..pos];
        if !typed.starts_with('/') || typed.contains(' ') {
            return None;
        }
        let mut matches = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(typed) && cmd.len() > typed.len());
        let first = matches.next()?;
        // Hint only an unambiguous prefix.
        if matches.next().is_some() {
            return None;
        }
        Some(first[typed.len()..].to_string())
    }
}

impl Validator for CliHelper {}

#[derive(Parser)]
#[command(name = "docchat")]
#[command(about = "Document Q&A chat with upload-driven retrieval", long_about = None)]
struct Cli {
    /// Model to use, overriding secret.json / environment configuration
    #[arg(long)]
    model: Option<String>,

    /// Optional TOML file with assistant settings overrides
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Local knowledge file answered by the domain responder
    #[arg(long)]
    knowledge: Option<PathBuf>,

    /// Comma-separated keywords that route a message to the domain responder
    #[arg(long, value_delimiter = ',')]
    knowledge_triggers: Vec<String>,
}

fn print_chat(sender: &Sender, content: &str) {
    println!(
        "{}",
        format!("[{} {}]", sender.avatar(), sender.display_name()).bright_magenta()
    );
    for line in content.lines() {
        let colored_line = match sender {
            Sender::User => line.green(),
            Sender::Assistant => line.bright_blue(),
            Sender::System => line.yellow(),
            Sender::Domain(_) => line.bright_cyan(),
        };
        println!("{colored_line}");
    }
    println!();
}

/// The main entry point for the docchat REPL application.
///
/// Sets up a rustyline-based chat REPL that:
/// 1. Initializes the remote assistant store and the chat coordinator
/// 2. Drains UI events on a background printer task
/// 3. Provides command completion for /upload and /cancel
/// 4. Routes user lines into the coordinator without blocking the prompt
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => AssistantSettings::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => AssistantSettings::default(),
    };
    if let Some(model) = cli.model {
        settings.model = model;
    }

    let store: Arc<dyn AssistantStore> =
        Arc::new(OpenAiAssistantStore::try_from_env()?.with_model(settings.model.clone()));

    let (sink, mut ui_rx) = UiSink::channel();
    let mut coordinator = ChatCoordinator::new(store, settings, sink);
    if let Some(path) = &cli.knowledge {
        coordinator = coordinator.with_responder(Arc::new(KeywordKnowledgeResponder::from_file(
            "knowledge",
            path,
            cli.knowledge_triggers.clone(),
        )?));
    }
    let coordinator = Arc::new(coordinator);

    // Drain UI events in the background so chat output never waits on the prompt.
    let printer = tokio::spawn(async move {
        while let Some(event) = ui_rx.recv().await {
            match event {
                UiEvent::Chat(message) => print_chat(&message.sender, &message.content),
                UiEvent::UploadStatus { label, busy } => {
                    let status = if busy {
                        format!("⏳ {label}").yellow()
                    } else {
                        format!("📄 {label}").bright_green()
                    };
                    println!("{status}");
                }
            }
        }
    });

    // ===== REPL Setup =====
    let mut rl = Editor::new()?;
    rl.set_helper(Some(CliHelper));

    println!("{}", "=== docchat ===".bright_magenta().bold());
    println!("{}", "Ask your question about the document!!".yellow());
    println!(
        "{}",
        "Type '/upload <path>' to attach a document, '/cancel' to stop the session, or 'quit' to exit."
            .bright_black()
    );
    println!();

    // ===== Main REPL Loop =====
    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed == "quit" || trimmed == "exit" {
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                if let Some(path) = trimmed.strip_prefix("/upload ") {
                    let path = PathBuf::from(path.trim());
                    let coordinator = Arc::clone(&coordinator);
                    // Uploads run in the background; progress arrives as UI events.
                    tokio::spawn(async move {
                        match tokio::fs::read(&path).await {
                            Ok(bytes) => {
                                let filename = file_name_of(&path);
                                if let Err(err) = coordinator.handle_upload(&filename, bytes).await
                                {
                                    tracing::error!(error = %err, "upload failed");
                                }
                            }
                            Err(err) => {
                                eprintln!(
                                    "{}",
                                    format!("Could not read {}: {err}", path.display()).red()
                                );
                            }
                        }
                    });
                } else if trimmed == "/cancel" {
                    coordinator.cancel_session();
                } else {
                    coordinator.handle_user_message(trimmed.to_string()).await;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Readline error: {err:?}").red());
                break;
            }
        }
    }

    printer.abort();
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_string()
}
