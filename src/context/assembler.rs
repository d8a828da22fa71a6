//! Budget-aware prompt assembly
//!
//! Combines retrieved context with a trimmed conversation window and the
//! live query, then sheds content until the rendered prompt fits the total
//! budget. Retrieved context is sacrificed before conversational state,
//! and recent state before older state.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::context::counter::TokenCounter;
use crate::context::history::select_history;
use crate::context::prompt::{AssembledPrompt, DEFAULT_PREAMBLE};
use crate::context::truncate::{char_len, truncate_at_word_boundary};
use crate::errors::{EngineError, Result};
use crate::types::{ConversationTurn, RetrievedItem};

/// Per-field size limits, all in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budgets {
    /// Maximum snippet length per retrieved item
    pub snippet_chars: usize,
    /// Maximum content length per history turn
    pub message_chars: usize,
    /// Number of most recent turns to include
    pub history_turns: usize,
    /// Maximum total size of the rendered prompt
    pub total_chars: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            snippet_chars: 1000,
            message_chars: 1000,
            history_turns: 2,
            total_chars: 3000,
        }
    }
}

impl Budgets {
    /// Halved budgets for the single overflow retry.
    ///
    /// A non-empty history window never shrinks below one turn.
    pub fn reduced(&self) -> Self {
        let history_turns = if self.history_turns == 0 {
            0
        } else {
            (self.history_turns / 2).max(1)
        };
        Self {
            snippet_chars: self.snippet_chars / 2,
            message_chars: self.message_chars / 2,
            history_turns,
            total_chars: self.total_chars / 2,
        }
    }
}

/// Something the assembler (or engine) cut, dropped or worked around
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TruncationWarning {
    SnippetTruncated {
        document_id: String,
        original_chars: usize,
        kept_chars: usize,
    },
    HistoryMessageTruncated {
        turn_index: usize,
        original_chars: usize,
        kept_chars: usize,
    },
    ItemDropped {
        document_id: String,
    },
    HistoryTurnDropped {
        turn_index: usize,
    },
    IndexUnavailable {
        reason: String,
    },
    ReducedBudgetRetry {
        total_chars: usize,
    },
    ModelRetry {
        reason: String,
    },
}

impl TruncationWarning {
    /// Whether the warning means prompt content was lost
    pub fn is_truncation(&self) -> bool {
        !matches!(
            self,
            TruncationWarning::IndexUnavailable { .. } | TruncationWarning::ModelRetry { .. }
        )
    }
}

/// Output of one assembly pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assembly {
    pub prompt: AssembledPrompt,
    pub warnings: Vec<TruncationWarning>,
    /// Rendered prompt text
    pub text: String,
    pub size_chars: usize,
    pub estimated_tokens: usize,
    /// Estimate with the counter's safety margin
    pub token_upper_bound: usize,
}

impl Assembly {
    /// Items that made it into the context block, for citation
    pub fn used_items(&self) -> &[RetrievedItem] {
        &self.prompt.context_block
    }

    pub fn is_truncated(&self) -> bool {
        self.warnings.iter().any(TruncationWarning::is_truncation)
    }
}

/// Deterministic single-pass context assembler
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    preamble: String,
    counter: TokenCounter,
}

impl ContextAssembler {
    /// Create with the default preamble
    pub fn new() -> Self {
        Self::with_preamble(DEFAULT_PREAMBLE)
    }

    /// Create with a custom system preamble
    pub fn with_preamble(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
            counter: TokenCounter::new(),
        }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Assemble a prompt that fits `budgets.total_chars`
    ///
    /// # Algorithm
    ///
    /// ```text
    /// 1. Order items by score desc, first-seen rank asc; cut snippets
    /// 2. Keep the last `history_turns` turns, chronological
    /// 3. Cut each kept turn to `message_chars`
    /// 4. Render preamble + context + history + query
    /// 5. While over budget: drop the lowest-scoring item
    /// 6. While over budget: drop the oldest remaining turn
    /// 7. Still over budget: the query itself cannot be represented
    /// ```
    pub fn assemble(
        &self,
        items: &[RetrievedItem],
        history: &[ConversationTurn],
        query: &str,
        budgets: &Budgets,
    ) -> Result<Assembly> {
        let mut warnings = Vec::new();

        // Step 1: order and cut retrieved items
        let mut ordered: Vec<RetrievedItem> = items.to_vec();
        ordered.sort_by(compare_relevance);
        for item in ordered.iter_mut() {
            let cut = truncate_at_word_boundary(&item.snippet, budgets.snippet_chars);
            if cut.truncated {
                warnings.push(TruncationWarning::SnippetTruncated {
                    document_id: item.document_id.clone(),
                    original_chars: cut.original_chars,
                    kept_chars: cut.kept_chars(),
                });
                item.truncated = true;
            }
            item.snippet = cut.text;
        }

        // Steps 2-3: history window with per-message cuts
        let selected = select_history(history, budgets.history_turns, budgets.message_chars);
        let mut turn_indices = Vec::with_capacity(selected.len());
        let mut turns = Vec::with_capacity(selected.len());
        for turn in selected {
            if turn.truncated {
                warnings.push(TruncationWarning::HistoryMessageTruncated {
                    turn_index: turn.source_index,
                    original_chars: turn.original_chars,
                    kept_chars: char_len(&turn.turn.content),
                });
            }
            turn_indices.push(turn.source_index);
            turns.push(turn.turn);
        }

        // Step 4
        let mut prompt = AssembledPrompt {
            system_preamble: self.preamble.clone(),
            context_block: ordered,
            history_block: turns,
            user_query: query.to_string(),
        };

        // Step 5: shed the least relevant context first
        let mut size = prompt.size();
        while size > budgets.total_chars {
            let Some(dropped) = prompt.context_block.pop() else {
                break;
            };
            debug!(document_id = %dropped.document_id, size, budget = budgets.total_chars, "dropping retrieved item");
            warnings.push(TruncationWarning::ItemDropped {
                document_id: dropped.document_id,
            });
            size = prompt.size();
        }

        // Step 6: then the oldest conversation turns
        while size > budgets.total_chars && !prompt.history_block.is_empty() {
            prompt.history_block.remove(0);
            let turn_index = turn_indices.remove(0);
            debug!(turn_index, size, budget = budgets.total_chars, "dropping history turn");
            warnings.push(TruncationWarning::HistoryTurnDropped { turn_index });
            size = prompt.size();
        }

        // Step 7
        if size > budgets.total_chars {
            return Err(EngineError::UnrepresentableInput {
                query_chars: char_len(query),
                required_chars: prompt.minimal_size(),
                budget: budgets.total_chars,
            });
        }

        let text = prompt.render();
        Ok(Assembly {
            estimated_tokens: self.counter.estimate(&text),
            token_upper_bound: self.counter.upper_bound(&text),
            prompt,
            warnings,
            text,
            size_chars: size,
        })
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Descending similarity, ties by first-seen rank
fn compare_relevance(a: &RetrievedItem, b: &RetrievedItem) -> Ordering {
    b.similarity_score
        .total_cmp(&a.similarity_score)
        .then_with(|| a.rank.cmp(&b.rank))
}
