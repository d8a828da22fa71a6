//! Interactive chat loop
//!
//! Reads questions with rustyline, streams answers from the engine as they
//! are generated and records both sides of each successful exchange in the
//! session store.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::warn;

use crate::cli::args::Verbosity;
use crate::cli::commands::ChatCommand;
use crate::cli::display;
use crate::rag::{AnswerRequest, ContextEngine};
use crate::session::ConversationStore;
use crate::types::ConversationTurn;

/// One interactive session bound to a conversation id
pub struct ChatSession {
    engine: Arc<ContextEngine>,
    store: Arc<dyn ConversationStore>,
    session_id: String,
    top_k: Option<usize>,
    verbosity: Verbosity,
}

impl ChatSession {
    pub fn new(
        engine: Arc<ContextEngine>,
        store: Arc<dyn ConversationStore>,
        session_id: String,
        top_k: Option<usize>,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            engine,
            store,
            session_id,
            top_k,
            verbosity,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run until `/exit` or Ctrl-D
    pub async fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new()?;
        self.show_banner();

        loop {
            let line = match editor.readline(">contextbuddy: ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(anyhow::anyhow!("Readline error: {}", err)),
            };

            let command = ChatCommand::parse(&line);
            if !matches!(command, ChatCommand::Empty) {
                let _ = editor.add_history_entry(line.trim());
            }

            if !self.handle(command).await? {
                break;
            }
        }

        println!("{}", "Goodbye!".green());
        Ok(())
    }

    /// Handle one input; returns false when the loop should stop
    pub async fn handle(&mut self, command: ChatCommand) -> Result<bool> {
        match command {
            ChatCommand::Empty => {}
            ChatCommand::Help => self.show_help(),
            ChatCommand::Exit => return Ok(false),
            ChatCommand::Stats => display::show_cache_stats(&self.engine.cache_stats()),
            ChatCommand::ClearCache => {
                self.engine.clear_cache();
                println!("{}", "Retrieval cache cleared.".yellow());
            }
            ChatCommand::History { limit } => {
                let turns = self.store.read(&self.session_id)?;
                display::show_turns(&turns, limit.unwrap_or(10));
            }
            ChatCommand::Unknown { input } => {
                println!("{}", format!("Unknown command: {}", input).red());
                println!("Type {} for available commands", "/help".cyan());
            }
            ChatCommand::Ask(query) => self.ask(&query).await?,
        }
        Ok(true)
    }

    async fn ask(&self, query: &str) -> Result<()> {
        let history = self.store.read(&self.session_id)?;
        let mut request = AnswerRequest::new(query).with_history(history);
        request.top_k = self.top_k;

        // Spinner until the first piece arrives
        let pb = display::spinner("Thinking...", self.verbosity.show_progress());
        let started = self.engine.answer_stream(request).await;
        pb.finish_and_clear();

        // A failed call leaves the session untouched
        let mut streaming = match started {
            Ok(streaming) => streaming,
            Err(e) => {
                display::show_error(&e.to_string());
                return Ok(());
            }
        };

        println!();
        let mut stdout = io::stdout();
        while let Some(piece) = streaming.next_piece().await {
            match piece {
                Ok(text) => {
                    print!("{}", text);
                    let _ = stdout.flush();
                }
                Err(e) => {
                    println!();
                    display::show_error(&e.to_string());
                    return Ok(());
                }
            }
        }
        println!("\n");

        let answer = streaming.into_answer().await?;
        display::show_answer_footer(&answer, self.verbosity.show_details());
        self.record(query, &answer.response);
        Ok(())
    }

    fn record(&self, query: &str, response: &str) {
        let turns = [
            ConversationTurn::user(query),
            ConversationTurn::assistant(response),
        ];
        for turn in turns {
            if let Err(e) = self.store.append(&self.session_id, turn) {
                warn!(session_id = %self.session_id, "Failed to save turn: {:#}", e);
                return;
            }
        }
    }

    fn show_banner(&self) {
        let width = 64;
        println!("\n{}", "=".repeat(width).cyan());
        println!(
            "{}",
            format!("  contextbuddy {} - Interactive Chat", env!("CARGO_PKG_VERSION"))
                .bold()
                .cyan()
        );
        println!("{}", format!("  Session: {}", self.session_id).dimmed());
        println!("{}\n", "=".repeat(width).cyan());
        println!(
            "Ask a question (or {} for commands, {} to quit)\n",
            "/help".green(),
            "/exit".green()
        );
    }

    fn show_help(&self) {
        println!("\n{}", "Available Commands:".bold().cyan());
        println!("{}", "=".repeat(60).cyan());
        for (cmd, desc) in ChatCommand::help_rows() {
            println!("  {:<20} {}", cmd.green(), desc);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::EmbeddingIndex;
    use crate::models::{LanguageModel, ModelError, TokenStream};
    use crate::rag::EngineSettings;
    use crate::session::MemoryConversationStore;
    use crate::types::{Filters, Role, SearchHit};
    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};

    struct EmptyIndex;

    #[async_trait]
    impl EmbeddingIndex for EmptyIndex {
        async fn search(&self, _: &str, _: usize, _: &Filters) -> anyhow::Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    struct EchoModel {
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, _: &str, _: usize) -> std::result::Result<String, ModelError> {
            if self.fail {
                Err(ModelError::Unavailable("down".into()))
            } else {
                Ok("echo".into())
            }
        }
    }

    /// Streams a fixed reply in pieces, optionally failing after the last one
    struct PiecesModel {
        pieces: Vec<&'static str>,
        break_mid_stream: bool,
    }

    #[async_trait]
    impl LanguageModel for PiecesModel {
        async fn complete(&self, _: &str, _: usize) -> std::result::Result<String, ModelError> {
            Ok(self.pieces.concat())
        }

        async fn complete_stream(
            &self,
            _: &str,
            _: usize,
        ) -> std::result::Result<TokenStream, ModelError> {
            let mut items: Vec<std::result::Result<String, ModelError>> =
                self.pieces.iter().map(|p| Ok(p.to_string())).collect();
            if self.break_mid_stream {
                items.push(Err(ModelError::Unavailable("connection reset".into())));
            }
            Ok(stream::iter(items).boxed())
        }
    }

    fn session(fail: bool) -> (ChatSession, Arc<MemoryConversationStore>) {
        session_with(Arc::new(EchoModel { fail }))
    }

    fn session_with(model: Arc<dyn LanguageModel>) -> (ChatSession, Arc<MemoryConversationStore>) {
        let engine = Arc::new(ContextEngine::new(
            Arc::new(EmptyIndex),
            model,
            EngineSettings::default(),
        ));
        let store = Arc::new(MemoryConversationStore::new());
        let chat = ChatSession::new(
            engine,
            store.clone(),
            "chat-test".into(),
            None,
            Verbosity::Quiet,
        );
        (chat, store)
    }

    #[tokio::test]
    async fn test_successful_exchange_is_recorded() {
        let (mut chat, store) = session(false);
        assert!(chat.handle(ChatCommand::Ask("hello".into())).await.unwrap());

        let turns = store.read("chat-test").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].content, "echo");
    }

    #[tokio::test]
    async fn test_failed_exchange_is_not_recorded() {
        let (mut chat, store) = session(true);
        chat.handle(ChatCommand::Ask("hello".into())).await.unwrap();
        assert!(store.read("chat-test").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_streamed_reply_is_recorded_whole() {
        let (mut chat, store) = session_with(Arc::new(PiecesModel {
            pieces: vec!["Attention ", "weighs ", "tokens."],
            break_mid_stream: false,
        }));
        chat.handle(ChatCommand::Ask("what is attention?".into()))
            .await
            .unwrap();

        let turns = store.read("chat-test").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "Attention weighs tokens.");
    }

    #[tokio::test]
    async fn test_stream_broken_midway_is_not_recorded() {
        let (mut chat, store) = session_with(Arc::new(PiecesModel {
            pieces: vec!["partial "],
            break_mid_stream: true,
        }));
        assert!(chat.handle(ChatCommand::Ask("q".into())).await.unwrap());
        assert!(store.read("chat-test").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exit_stops_loop() {
        let (mut chat, _) = session(false);
        assert!(!chat.handle(ChatCommand::Exit).await.unwrap());
    }
}
