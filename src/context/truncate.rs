//! Character-budget truncation
//!
//! Limits are counted in Unicode scalar values, so a cut can never land
//! inside a multi-byte character. Cuts prefer the last whitespace inside
//! the limit, unless that would throw away more than half the budget.

/// Result of truncating one piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub text: String,
    pub original_chars: usize,
    pub truncated: bool,
}

impl Truncated {
    /// Characters kept after the cut
    pub fn kept_chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Number of characters in `text`
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Cut `text` to at most `limit` characters, at a word boundary when possible
pub fn truncate_at_word_boundary(text: &str, limit: usize) -> Truncated {
    let original_chars = char_len(text);
    if original_chars <= limit {
        return Truncated {
            text: text.to_string(),
            original_chars,
            truncated: false,
        };
    }

    // Byte offset of the first character past the limit
    let end = text
        .char_indices()
        .nth(limit)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let hard_cut = &text[..end];

    let next_is_space = text[end..].chars().next().map_or(false, char::is_whitespace);
    let cut = if next_is_space {
        hard_cut.trim_end()
    } else {
        match hard_cut.rfind(char::is_whitespace) {
            Some(space) if char_len(&hard_cut[..space]) >= limit / 2 => hard_cut[..space].trim_end(),
            _ => hard_cut,
        }
    };

    Truncated {
        text: cut.to_string(),
        original_chars,
        truncated: true,
    }
}
