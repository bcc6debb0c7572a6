//! Interactive question loop with upload and session commands.

use crate::database::VectorIndex;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::generation::GenerationProvider;
use crate::rag::RagEngine;
use crate::session::{SessionStore, TIMESTAMP_FORMAT};
use crate::uploads::{self, UploadStore};
use log::error;
use std::io::{BufRead, Write};
use std::path::Path;

const HELP: &str = "\
Commands:
  /upload <path>   upload and index a pdf, docx or txt file
  /files           list uploaded files
  /sessions        list chat sessions
  /history [id]    show the history of a session (default: current)
  /help            show this help
  exit, quit       leave the chat
Anything else is asked as a question.";

#[derive(Debug, PartialEq)]
pub enum Command {
    Ask(String),
    Upload(String),
    Files,
    Sessions,
    History(Option<String>),
    Help,
    Exit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim();

        if line.is_empty() {
            return Command::Empty;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Command::Exit;
        }
        if !line.starts_with('/') {
            return Command::Ask(line.to_string());
        }

        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
            None => (line, None),
        };

        match (name, arg) {
            ("/upload", Some(path)) => Command::Upload(path),
            ("/files", _) => Command::Files,
            ("/sessions", _) => Command::Sessions,
            ("/history", id) => Command::History(id),
            ("/help", _) => Command::Help,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

/// A chat bound to one session; failures are reported and the loop continues
pub struct ChatShell<'a, E, I, G> {
    engine: &'a RagEngine<E, I, G>,
    uploads: &'a mut UploadStore,
    sessions: &'a mut SessionStore,
    session_id: String,
}

impl<'a, E, I, G> ChatShell<'a, E, I, G>
where
    E: EmbeddingProvider,
    I: VectorIndex,
    G: GenerationProvider,
{
    pub fn new(
        engine: &'a RagEngine<E, I, G>,
        uploads: &'a mut UploadStore,
        sessions: &'a mut SessionStore,
        session_id: Option<&str>,
    ) -> Self {
        let session_id = sessions.open(session_id);
        ChatShell {
            engine,
            uploads,
            sessions,
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Read lines from `input` until exit or end of input
    pub async fn run<R: BufRead, W: Write>(&mut self, mut input: R, output: &mut W) -> Result<()> {
        writeln!(
            output,
            "Session {}. Type /help for commands, 'exit' to quit.",
            self.session_id
        )?;

        let mut buffer = String::new();

        loop {
            write!(output, "\nYour question: ")?;
            output.flush()?;

            buffer.clear();
            if input.read_line(&mut buffer)? == 0 {
                break;
            }

            match Command::parse(&buffer) {
                Command::Exit => {
                    writeln!(output, "Goodbye!")?;
                    break;
                }
                Command::Empty => {}
                Command::Help => writeln!(output, "{}", HELP)?,
                Command::Ask(question) => self.ask(&question, output).await?,
                Command::Upload(path) => self.upload(&path, output).await?,
                Command::Files => self.list_files(output)?,
                Command::Sessions => self.list_sessions(output)?,
                Command::History(id) => self.show_history(id.as_deref(), output)?,
                Command::Unknown(line) => {
                    writeln!(output, "Unknown command: {}. Type /help for commands.", line)?
                }
            }
        }

        Ok(())
    }

    async fn ask<W: Write>(&mut self, question: &str, output: &mut W) -> Result<()> {
        match self.engine.answer(question).await {
            Ok(answer) => {
                writeln!(output, "\n{}", answer)?;
                self.sessions.record(&self.session_id, question, &answer);
            }
            Err(e) => {
                error!("Failed to answer question: {}", e);
                writeln!(output, "Error: {}", e)?;
            }
        }
        Ok(())
    }

    async fn upload<W: Write>(&mut self, path: &str, output: &mut W) -> Result<()> {
        match uploads::upload_document(self.uploads, self.engine, Path::new(path)).await {
            Ok(record) => writeln!(
                output,
                "Indexed {} ({} chunks)",
                record.original_name, record.chunks
            )?,
            Err(e) => {
                error!("Failed to upload {}: {}", path, e);
                writeln!(output, "Error: {}", e)?;
            }
        }
        Ok(())
    }

    fn list_files<W: Write>(&self, output: &mut W) -> Result<()> {
        if self.uploads.files().is_empty() {
            writeln!(output, "No files uploaded yet.")?;
        }
        for file in self.uploads.files() {
            writeln!(
                output,
                "{}  {} bytes  {} chunks  {}",
                file.original_name,
                file.size,
                file.chunks,
                file.upload_time.format(TIMESTAMP_FORMAT)
            )?;
        }
        Ok(())
    }

    fn list_sessions<W: Write>(&self, output: &mut W) -> Result<()> {
        for summary in self.sessions.summaries() {
            let marker = if summary.id == self.session_id { "*" } else { " " };
            writeln!(
                output,
                "{} {}  {}  {} messages",
                marker,
                summary.id,
                summary.created_at.format(TIMESTAMP_FORMAT),
                summary.message_count
            )?;
        }
        Ok(())
    }

    fn show_history<W: Write>(&self, id: Option<&str>, output: &mut W) -> Result<()> {
        let id = id.unwrap_or(&self.session_id);

        match self.sessions.history(id) {
            Some([]) => writeln!(output, "No messages in session {}.", id)?,
            Some(history) => {
                for exchange in history {
                    writeln!(
                        output,
                        "[{}] Q: {}\nA: {}",
                        exchange.timestamp.format(TIMESTAMP_FORMAT),
                        exchange.query,
                        exchange.response
                    )?;
                }
            }
            None => writeln!(output, "Session not found: {}", id)?,
        }
        Ok(())
    }
}
