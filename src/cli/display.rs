//! Terminal output helpers
//!
//! Colored rendering of answers, citations, warnings and cache stats, plus
//! the spinner shown while a query is in flight.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::cache::CacheStats;
use crate::context::TruncationWarning;
use crate::rag::Answer;
use crate::session::SessionSummary;
use crate::types::ConversationTurn;

/// Spinner for a pending stage; hidden when progress output is off
pub fn spinner(message: &str, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print the response followed by its sources
pub fn show_answer(answer: &Answer, details: bool) {
    println!("\n{}\n", answer.response.trim());
    show_answer_footer(answer, details);
}

/// Sources, truncation notice and (when `details`) per-answer diagnostics
///
/// Printed after the response, whether it was shown whole or streamed.
pub fn show_answer_footer(answer: &Answer, details: bool) {
    if !answer.items_used.is_empty() {
        println!("{}", "Sources:".bold().cyan());
        for (i, item) in answer.items_used.iter().enumerate() {
            let score = format!("(score {:.3})", item.similarity_score).dimmed();
            let cut = if item.truncated {
                " [truncated]".yellow().to_string()
            } else {
                String::new()
            };
            println!("  {} {}{}", item.citation_tag(i + 1).green(), score, cut);
        }
    } else if answer.degraded {
        println!(
            "{}",
            "No retrieved context was available; answered from conversation only.".yellow()
        );
    }

    if answer.is_truncated() && !details {
        println!(
            "{}",
            format!(
                "Context was truncated to fit the prompt budget ({} warnings).",
                answer.warnings.len()
            )
            .yellow()
        );
    }

    if details {
        show_warnings(&answer.warnings);
        println!(
            "{}",
            format!(
                "cache: {} | prompt: {} chars (~{} tokens, at most ~{}) | retried: {}",
                if answer.cache_hit { "hit" } else { "miss" },
                answer.prompt_chars,
                answer.estimated_tokens,
                answer.token_upper_bound,
                answer.retried
            )
            .dimmed()
        );
    }
    println!();
}

/// One line per warning
pub fn show_warnings(warnings: &[TruncationWarning]) {
    for warning in warnings {
        println!("  {} {}", "!".yellow(), describe_warning(warning).dimmed());
    }
}

/// Human-readable warning text
pub fn describe_warning(warning: &TruncationWarning) -> String {
    match warning {
        TruncationWarning::SnippetTruncated {
            document_id,
            original_chars,
            kept_chars,
        } => format!(
            "snippet {} cut from {} to {} chars",
            document_id, original_chars, kept_chars
        ),
        TruncationWarning::HistoryMessageTruncated {
            turn_index,
            original_chars,
            kept_chars,
        } => format!(
            "history turn {} cut from {} to {} chars",
            turn_index, original_chars, kept_chars
        ),
        TruncationWarning::ItemDropped { document_id } => {
            format!("document {} dropped to fit the budget", document_id)
        }
        TruncationWarning::HistoryTurnDropped { turn_index } => {
            format!("history turn {} dropped to fit the budget", turn_index)
        }
        TruncationWarning::IndexUnavailable { reason } => {
            format!("index unavailable: {}", reason)
        }
        TruncationWarning::ReducedBudgetRetry { total_chars } => format!(
            "model window overflowed, retried with a {} char budget",
            total_chars
        ),
        TruncationWarning::ModelRetry { reason } => format!("model retried after: {}", reason),
    }
}

/// Print cache counters
pub fn show_cache_stats(stats: &CacheStats) {
    println!("\n{}", "Retrieval Cache:".bold().cyan());
    println!("{}", "=".repeat(40).cyan());
    println!("  {:<14} {}/{}", "Entries:", stats.size, stats.capacity);
    println!("  {:<14} {}s", "TTL:", stats.ttl_secs);
    println!("  {:<14} {}", "Hits:", stats.hits.to_string().green());
    println!("  {:<14} {}", "Misses:", stats.misses.to_string().yellow());
    println!("  {:<14} {:.1}%", "Hit rate:", stats.hit_rate() * 100.0);
    println!("  {:<14} {}", "Evictions:", stats.evictions);
    println!("  {:<14} {}", "Expirations:", stats.expirations);
    println!();
}

/// Print the last `limit` turns of a session
pub fn show_turns(turns: &[ConversationTurn], limit: usize) {
    if turns.is_empty() {
        println!("{}", "No turns in this session yet.".yellow());
        return;
    }

    let start = turns.len().saturating_sub(limit);
    for turn in &turns[start..] {
        let label = match turn.role {
            crate::types::Role::User => turn.role.label().cyan(),
            crate::types::Role::Assistant => turn.role.label().green(),
            crate::types::Role::System => turn.role.label().dimmed(),
        };
        let time = turn.timestamp.format("%Y-%m-%d %H:%M").to_string();
        println!("{} {}", label.bold(), time.dimmed());
        println!("  {}", turn.content);
    }
    println!();
}

/// Print a table of stored sessions
pub fn show_sessions(sessions: &[SessionSummary]) {
    if sessions.is_empty() {
        println!("{}", "No saved sessions.".yellow());
        return;
    }

    println!("\n{}", "Sessions:".bold().cyan());
    println!("{}", "=".repeat(72).cyan());
    for session in sessions {
        println!(
            "  {}  {:>3} turns  {}  {}",
            session.session_id.green(),
            session.total_turns,
            session
                .updated_at
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .dimmed(),
            session.topic.as_deref().unwrap_or("")
        );
    }
    println!();
}

/// Print an error in the standard style
pub fn show_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}
