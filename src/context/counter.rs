//! Token estimation for assembled prompts
//!
//! Budgets are enforced in characters; this heuristic only reports how many
//! tokens a prompt is likely to cost (estimate and upper bound, both carried
//! on every `Answer`) so callers can compare it against the model's own window.
//!
//! # Algorithm
//!
//! Base estimate: 1 token ≈ 4 characters (English)
//! Upper bound: estimate × 1.10 (conservative safety margin)

/// Token counter with heuristic-based estimation
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    /// Create new token counter
    pub fn new() -> Self {
        Self
    }

    /// Estimate token count for text
    ///
    /// ```text
    /// estimate_tokens(text) = ⌈chars(text) / 4⌉
    /// ```
    ///
    /// # Examples
    ///
    /// ```
    /// # use contextbuddy::context::TokenCounter;
    /// let counter = TokenCounter::new();
    /// assert_eq!(counter.estimate(&"a".repeat(100)), 25);
    /// ```
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();
        (char_count + 3) / 4
    }

    /// Conservative upper bound (110% of estimate, rounded up)
    pub fn upper_bound(&self, text: &str) -> usize {
        (self.estimate(text) as f64 * 1.10).ceil() as usize
    }
}
