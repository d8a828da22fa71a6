//! Assembled prompt and its rendering
//!
//! Layout, sections separated by a blank line and omitted when empty:
//!
//! ```text
//! <system preamble>
//!
//! Context:
//! [1] <title> (source: <source>, id: <id>)
//! <snippet>
//!
//! Conversation:
//! User: ...
//! Assistant: ...
//!
//! Question: <user query>
//! ```

use serde::Serialize;

use crate::context::truncate::char_len;
use crate::types::{ConversationTurn, RetrievedItem};

/// Default system preamble
pub const DEFAULT_PREAMBLE: &str = "You are a research assistant. Answer using the numbered context \
documents and cite them as [n]. If the context is not enough, say so.";

const SECTION_SEPARATOR: &str = "\n\n";

/// A size-bounded prompt built fresh for each query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledPrompt {
    pub system_preamble: String,
    /// Selected items in similarity order, snippets already cut
    pub context_block: Vec<RetrievedItem>,
    /// Chronological history window
    pub history_block: Vec<ConversationTurn>,
    pub user_query: String,
}

impl AssembledPrompt {
    /// Render the full prompt text sent to the model
    pub fn render(&self) -> String {
        let mut sections: Vec<String> = Vec::with_capacity(4);

        if !self.system_preamble.is_empty() {
            sections.push(self.system_preamble.clone());
        }
        if !self.context_block.is_empty() {
            sections.push(self.render_context());
        }
        if !self.history_block.is_empty() {
            sections.push(self.render_history());
        }
        sections.push(format!("Question: {}", self.user_query));

        sections.join(SECTION_SEPARATOR)
    }

    /// Context section only, with citation tags
    pub fn render_context(&self) -> String {
        let documents: Vec<String> = self
            .context_block
            .iter()
            .enumerate()
            .map(|(idx, item)| format!("{}\n{}", item.citation_tag(idx + 1), item.snippet))
            .collect();
        format!("Context:\n{}", documents.join(SECTION_SEPARATOR))
    }

    /// History section only
    pub fn render_history(&self) -> String {
        let turns: Vec<String> = self
            .history_block
            .iter()
            .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
            .collect();
        format!("Conversation:\n{}", turns.join("\n"))
    }

    /// Total size in characters of the rendered prompt
    pub fn size(&self) -> usize {
        char_len(&self.render())
    }

    /// Size of the smallest representable prompt: preamble plus query
    pub fn minimal_size(&self) -> usize {
        AssembledPrompt {
            system_preamble: self.system_preamble.clone(),
            context_block: Vec::new(),
            history_block: Vec::new(),
            user_query: self.user_query.clone(),
        }
        .size()
    }
}
