//! Slash commands available inside `contextbuddy chat`

/// Chat input, either a built-in command or a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    /// Show retrieval cache statistics
    Stats,
    /// Drop every cached retrieval
    ClearCache,
    /// Show the last `limit` turns of the session
    History { limit: Option<usize> },
    Exit,
    /// Plain text to answer
    Ask(String),
    Empty,
    Unknown { input: String },
}

impl ChatCommand {
    /// Parse one line of chat input
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return ChatCommand::Empty;
        }

        let Some(rest) = trimmed.strip_prefix('/') else {
            return ChatCommand::Ask(trimmed.to_string());
        };

        let parts: Vec<&str> = rest.split_whitespace().collect();
        let Some(name) = parts.first() else {
            return ChatCommand::Unknown {
                input: trimmed.to_string(),
            };
        };

        match name.to_lowercase().as_str() {
            "help" | "h" => ChatCommand::Help,
            "stats" => ChatCommand::Stats,
            "clear-cache" => ChatCommand::ClearCache,
            "history" => ChatCommand::History {
                limit: parts.get(1).and_then(|s| s.parse().ok()),
            },
            "exit" | "quit" | "q" => ChatCommand::Exit,
            _ => ChatCommand::Unknown {
                input: trimmed.to_string(),
            },
        }
    }

    /// Help table rows: (command, description)
    pub fn help_rows() -> &'static [(&'static str, &'static str)] {
        &[
            ("/help, /h", "Show this help message"),
            ("/stats", "Show retrieval cache statistics"),
            ("/clear-cache", "Drop all cached retrievals"),
            ("/history [n]", "Show the last n turns (default: 10)"),
            ("/exit, /quit, /q", "Exit chat"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatCommand::parse("/help"), ChatCommand::Help);
        assert_eq!(ChatCommand::parse("/STATS"), ChatCommand::Stats);
        assert_eq!(ChatCommand::parse("/clear-cache"), ChatCommand::ClearCache);
        assert_eq!(ChatCommand::parse("/q"), ChatCommand::Exit);
    }

    #[test]
    fn test_parse_history_limit() {
        assert_eq!(
            ChatCommand::parse("/history 5"),
            ChatCommand::History { limit: Some(5) }
        );
        assert_eq!(
            ChatCommand::parse("/history"),
            ChatCommand::History { limit: None }
        );
    }

    #[test]
    fn test_plain_text_is_a_question() {
        assert_eq!(
            ChatCommand::parse("  what is attention?  "),
            ChatCommand::Ask("what is attention?".to_string())
        );
        assert_eq!(ChatCommand::parse("   "), ChatCommand::Empty);
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            ChatCommand::parse("/frobnicate"),
            ChatCommand::Unknown { .. }
        ));
        assert!(matches!(ChatCommand::parse("/"), ChatCommand::Unknown { .. }));
    }
}
