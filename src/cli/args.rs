//! Command-line argument parsing for contextbuddy
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::types::{Filters, MetadataValue};

/// contextbuddy - retrieval-augmented answers from a local model
#[derive(Parser, Debug)]
#[command(name = "contextbuddy")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Answer questions over an indexed corpus with a local Ollama model", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Answer a single question
    Ask {
        /// The question
        #[arg(value_name = "QUERY")]
        query: String,

        /// Conversation session to read history from and append to
        #[arg(short, long)]
        session: Option<String>,

        /// Number of documents to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Metadata filter as key=value (repeatable)
        #[arg(short, long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Do not record the exchange in the session
        #[arg(long)]
        no_save: bool,

        /// Skip the retrieval cache and search the index again
        #[arg(long)]
        no_cache: bool,

        /// Topic to label the session with
        #[arg(short, long, conflicts_with = "no_save")]
        topic: Option<String>,
    },

    /// Start an interactive chat session
    Chat {
        /// Resume an existing session
        #[arg(short, long)]
        session: Option<String>,

        /// Number of documents to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Topic to label the session with
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Index documents from a JSON Lines file
    Index {
        /// File with one `{"id", "text", "metadata"}` object per line
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List, show or delete stored sessions
    Sessions {
        /// Print the turns of a session
        #[arg(long, value_name = "ID")]
        show: Option<String>,

        /// Delete a session
        #[arg(long, value_name = "ID", conflicts_with = "show")]
        delete: Option<String>,
    },

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default tracing filter for this level, used when RUST_LOG is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "contextbuddy=info,warn",
            Verbosity::VeryVerbose => "contextbuddy=debug,info",
        }
    }

    /// Check if should show progress spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show per-answer details (cache, warnings, sizes)
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}

/// Parse `key=value` filter arguments
///
/// Values are typed the way they look: integers, floats and `true`/`false`
/// become scalars of that kind, anything else stays a string.
pub fn parse_filters(raw: &[String]) -> Result<Filters, String> {
    let mut filters = Filters::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("Filter must be KEY=VALUE, got {:?}", entry))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Filter key is empty in {:?}", entry));
        }
        filters.insert(key.to_string(), parse_scalar(value.trim()));
    }
    Ok(filters)
}

fn parse_scalar(value: &str) -> MetadataValue {
    if let Ok(i) = value.parse::<i64>() {
        MetadataValue::Integer(i)
    } else if let Some(f) = value.parse::<f64>().ok().filter(|f| f.is_finite()) {
        MetadataValue::Float(f)
    } else if let Ok(b) = value.parse::<bool>() {
        MetadataValue::Bool(b)
    } else {
        MetadataValue::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(verbose: u8, quiet: bool) -> Args {
        Args {
            config: None,
            verbose,
            quiet,
            command: Commands::Config,
        }
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(args(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(args(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(args(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(args(2, false).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_verbosity_methods() {
        assert!(!Verbosity::Quiet.show_progress());
        assert!(Verbosity::Normal.show_progress());

        assert!(!Verbosity::Normal.show_details());
        assert!(Verbosity::Verbose.show_details());

        assert_eq!(Verbosity::Quiet.log_filter(), "error");
    }

    #[test]
    fn test_parse_ask_command() {
        let args = Args::try_parse_from([
            "contextbuddy",
            "ask",
            "explain attention",
            "-k",
            "3",
            "--filter",
            "source=arxiv",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.verbosity(), Verbosity::Verbose);
        match args.command {
            Commands::Ask {
                query,
                top_k,
                filters,
                no_save,
                no_cache,
                topic,
                ..
            } => {
                assert_eq!(query, "explain attention");
                assert_eq!(top_k, Some(3));
                assert_eq!(filters, vec!["source=arxiv".to_string()]);
                assert!(!no_save);
                assert!(!no_cache);
                assert!(topic.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ask_fresh_search_with_topic() {
        let args = Args::try_parse_from([
            "contextbuddy",
            "ask",
            "what changed?",
            "--no-cache",
            "--topic",
            "transformers",
        ])
        .unwrap();

        match args.command {
            Commands::Ask {
                no_cache, topic, ..
            } => {
                assert!(no_cache);
                assert_eq!(topic.as_deref(), Some("transformers"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_topic_needs_a_saved_session() {
        let parsed = Args::try_parse_from([
            "contextbuddy",
            "ask",
            "q",
            "--no-save",
            "--topic",
            "t",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_chat_topic() {
        let args =
            Args::try_parse_from(["contextbuddy", "chat", "-t", "retrieval", "-s", "abc"]).unwrap();
        assert_eq!(
            args.command,
            Commands::Chat {
                session: Some("abc".to_string()),
                top_k: None,
                topic: Some("retrieval".to_string()),
            }
        );
    }

    #[test]
    fn test_sessions_show_conflicts_with_delete() {
        let parsed = Args::try_parse_from([
            "contextbuddy",
            "sessions",
            "--show",
            "a",
            "--delete",
            "b",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_filters_types_values() {
        let raw = vec![
            "source=arxiv".to_string(),
            "year=2023".to_string(),
            "score=0.5".to_string(),
            "peer_reviewed=true".to_string(),
        ];
        let filters = parse_filters(&raw).unwrap();

        assert_eq!(filters["source"], MetadataValue::from("arxiv"));
        assert_eq!(filters["year"], MetadataValue::Integer(2023));
        assert_eq!(filters["score"], MetadataValue::Float(0.5));
        assert_eq!(filters["peer_reviewed"], MetadataValue::Bool(true));
    }

    #[test]
    fn test_parse_filters_rejects_malformed() {
        assert!(parse_filters(&["novalue".to_string()]).is_err());
        assert!(parse_filters(&["=x".to_string()]).is_err());
    }
}
