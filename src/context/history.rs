//! Conversation history windowing
//!
//! Pure function of (history, window, per-message limit): no I/O, no
//! mutation of the caller's turns.

use crate::context::truncate::truncate_at_word_boundary;
use crate::types::ConversationTurn;

/// A history turn chosen for the prompt, possibly with shortened content
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedTurn {
    pub turn: ConversationTurn,
    /// Position of the turn in the full session history
    pub source_index: usize,
    pub original_chars: usize,
    pub truncated: bool,
}

/// Keep the last `window` turns in chronological order, each cut to
/// `per_message_chars` characters.
pub fn select_history(
    history: &[ConversationTurn],
    window: usize,
    per_message_chars: usize,
) -> Vec<SelectedTurn> {
    let start = history.len().saturating_sub(window);

    history[start..]
        .iter()
        .enumerate()
        .map(|(offset, turn)| {
            let cut = truncate_at_word_boundary(&turn.content, per_message_chars);
            SelectedTurn {
                turn: ConversationTurn {
                    role: turn.role,
                    content: cut.text,
                    timestamp: turn.timestamp,
                },
                source_index: start + offset,
                original_chars: cut.original_chars,
                truncated: cut.truncated,
            }
        })
        .collect()
}
