//! Interactive chat REPL.

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::History;
use rustyline::{DefaultEditor, Editor, Helper};
use tracing::debug;

use docqa_rag::{ChatHistory, RagPipeline, Role};

use crate::print_answer;

const HELP: &str = "\
Commands:
  /ingest <path>  index another document
  /history        show this conversation
  /clear          forget this conversation
  /reset          remove every indexed document
  /help           show this help
  /quit           leave";

fn print_history(history: &ChatHistory) {
    if history.is_empty() {
        println!("(no messages yet)");
        return;
    }
    for message in history.messages() {
        let speaker = match message.role {
            Role::User => "you",
            Role::Assistant => "docqa",
        };
        println!("{speaker}: {}", message.content.trim());
        if !message.sources.is_empty() {
            println!("       ({} sources)", message.sources.len());
        }
    }
}

/// Add `line` to the editor's history, logging failures.
fn remember<H: Helper, I: History>(editor: &mut Editor<H, I>, line: &str) {
    if let Err(e) = editor.add_history_entry(line) {
        debug!(error = %e, "failed to record history entry");
    }
}

/// Run the REPL until `/quit` or end of input. The history lives only as long
/// as the session.
pub async fn run(pipeline: &RagPipeline, k: usize, temperature: f32) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;
    let mut history = ChatHistory::new();

    println!("docqa chat. Ask a question, or /help for commands.");
    if pipeline.status().await.entries == 0 {
        println!("No documents are indexed yet. Use /ingest <path> to add one.");
    }

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("failed to read input"),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        remember(&mut editor, input);

        let (command, argument) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/history" => print_history(&history),
            "/clear" => {
                history.clear();
                println!("Conversation cleared.");
            }
            "/reset" => match pipeline.reset().await {
                Ok(()) => {
                    history.clear();
                    println!("Index cleared.");
                }
                Err(e) => eprintln!("error: {e}"),
            },
            "/ingest" if argument.is_empty() => println!("usage: /ingest <path>"),
            "/ingest" => match pipeline.process_document(argument).await {
                Ok(chunks) => println!("Indexed {argument} ({chunks} chunks)."),
                Err(e) => eprintln!("error: {e}"),
            },
            other if other.starts_with('/') => println!("Unknown command {other}. Try /help."),
            _ => {
                history.push_user(input);
                match pipeline.ask(input, k, temperature).await {
                    Ok(response) => {
                        print_answer(&response);
                        history.push_assistant(&response);
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
            }
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entered_lines_are_recalled() {
        let mut editor = DefaultEditor::new().unwrap();
        remember(&mut editor, "What color is the sky?");
        remember(&mut editor, "/history");
        assert_eq!(editor.history().len(), 2);
    }
}
