//! Context assembly module
//!
//! Handles snippet truncation, history windowing, prompt rendering and
//! budget enforcement.

pub mod assembler;
pub mod counter;
pub mod history;
pub mod prompt;
pub mod truncate;

// Re-export commonly used types
pub use assembler::{Assembly, Budgets, ContextAssembler, TruncationWarning};
pub use counter::TokenCounter;
pub use history::{select_history, SelectedTurn};
pub use prompt::{AssembledPrompt, DEFAULT_PREAMBLE};
pub use truncate::{char_len, truncate_at_word_boundary, Truncated};
