// End-to-end answer pipeline: cache -> index -> assemble -> model
use futures_util::stream::{self as futures_stream, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStats, RetrievalCache, DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::context::{Assembly, Budgets, ContextAssembler, TruncationWarning};
use crate::errors::{EngineError, Result};
use crate::index::EmbeddingIndex;
use crate::models::{LanguageModel, ModelError, TokenStream};
use crate::types::{ConversationTurn, Filters, RetrievedItem};

/// Engine defaults; every numeric field can be overridden per call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Number of documents requested from the index
    pub top_k: usize,
    pub budgets: Budgets,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Deadline for one index search
    pub index_timeout: Duration,
    /// Deadline for one model completion, or for each streamed piece
    pub model_timeout: Duration,
    /// Maximum generated tokens per completion
    pub max_output: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            budgets: Budgets::default(),
            cache_capacity: DEFAULT_CAPACITY,
            cache_ttl: DEFAULT_TTL,
            index_timeout: Duration::from_secs(5),
            model_timeout: Duration::from_secs(60),
            max_output: 2000,
        }
    }
}

/// One `answer` call with optional per-call overrides
#[derive(Debug, Clone, Default)]
pub struct AnswerRequest {
    pub query: String,
    pub history: Vec<ConversationTurn>,
    pub top_k: Option<usize>,
    pub filters: Filters,
    pub budgets: Option<Budgets>,
    pub cache_ttl: Option<Duration>,
    pub max_output: Option<usize>,
    /// Skip the cache lookup; a successful search still refreshes the entry
    pub bypass_cache: bool,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_budgets(mut self, budgets: Budgets) -> Self {
        self.budgets = Some(budgets);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = Some(max_output);
        self
    }

    /// Force a fresh index search, e.g. after re-indexing
    pub fn with_cache_bypass(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

/// Result of a successful `answer` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub response: String,
    /// Items that reached the prompt, in citation order
    pub items_used: Vec<RetrievedItem>,
    pub warnings: Vec<TruncationWarning>,
    /// Retrieval served from the cache
    pub cache_hit: bool,
    /// Answered without retrieved context because the index failed or found nothing
    pub degraded: bool,
    /// The single model retry was spent
    pub retried: bool,
    pub prompt_chars: usize,
    pub estimated_tokens: usize,
    pub token_upper_bound: usize,
}

impl Answer {
    /// Answer produced, but some prompt content was cut or dropped
    pub fn is_truncated(&self) -> bool {
        self.warnings.iter().any(TruncationWarning::is_truncation)
    }
}

/// An answer whose response text is still arriving
///
/// Retrieval, assembly and the retry decision are already settled: the
/// model produced its first piece before this was returned. Failures after
/// that point end the stream and are never retried.
pub struct StreamingAnswer {
    pieces: BoxStream<'static, Result<String>>,
    partial: Answer,
}

impl StreamingAnswer {
    /// Everything known up front; `response` holds the text received so far
    pub fn partial(&self) -> &Answer {
        &self.partial
    }

    /// Next piece of the response, `None` once the model is done
    pub async fn next_piece(&mut self) -> Option<Result<String>> {
        let piece = self.pieces.next().await?;
        if let Ok(text) = &piece {
            self.partial.response.push_str(text);
        }
        Some(piece)
    }

    /// Drain the remaining pieces into a complete `Answer`
    pub async fn into_answer(mut self) -> Result<Answer> {
        while let Some(piece) = self.next_piece().await {
            piece?;
        }
        Ok(self.partial)
    }
}

impl fmt::Debug for StreamingAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingAnswer")
            .field("partial", &self.partial)
            .finish_non_exhaustive()
    }
}

/// Parameters of one call after defaults are applied
struct Call<'a> {
    /// Trimmed
    query: &'a str,
    history: &'a [ConversationTurn],
    top_k: usize,
    filters: &'a Filters,
    budgets: Budgets,
    cache_ttl: Duration,
    max_output: usize,
    use_cache: bool,
}

/// Outcome of the retrieval stage
struct Retrieval {
    items: Vec<RetrievedItem>,
    cache_hit: bool,
    degraded: bool,
    warning: Option<TruncationWarning>,
}

/// Retrieved and assembled, ready for the model
struct Prepared {
    items: Vec<RetrievedItem>,
    assembly: Assembly,
    warnings: Vec<TruncationWarning>,
    cache_hit: bool,
    degraded: bool,
}

/// Model output plus the prompt that produced it
struct Completion<T> {
    output: T,
    assembly: Assembly,
    warnings: Vec<TruncationWarning>,
    retried: bool,
    cache_hit: bool,
    degraded: bool,
}

/// The context retrieval and assembly engine
///
/// Cheap to share behind an `Arc`: the cache is internally synchronized
/// and every other field is read-only.
pub struct ContextEngine {
    index: Arc<dyn EmbeddingIndex>,
    model: Arc<dyn LanguageModel>,
    cache: Arc<RetrievalCache>,
    assembler: ContextAssembler,
    settings: EngineSettings,
}

impl ContextEngine {
    /// Create engine with its own cache sized from `settings`
    pub fn new(
        index: Arc<dyn EmbeddingIndex>,
        model: Arc<dyn LanguageModel>,
        settings: EngineSettings,
    ) -> Self {
        let cache = Arc::new(RetrievalCache::new(
            settings.cache_capacity,
            settings.cache_ttl,
        ));
        Self::with_cache(index, model, cache, settings)
    }

    /// Create engine around an existing (possibly shared) cache
    pub fn with_cache(
        index: Arc<dyn EmbeddingIndex>,
        model: Arc<dyn LanguageModel>,
        cache: Arc<RetrievalCache>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            index,
            model,
            cache,
            assembler: ContextAssembler::new(),
            settings,
        }
    }

    /// Replace the prompt assembler (e.g. for a custom preamble)
    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Answer `query` using retrieved context and the session history
    pub async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
        top_k: Option<usize>,
        filters: &Filters,
    ) -> Result<Answer> {
        let call = Call {
            query: query.trim(),
            history,
            top_k: top_k.unwrap_or(self.settings.top_k),
            filters,
            budgets: self.settings.budgets,
            cache_ttl: self.settings.cache_ttl,
            max_output: self.settings.max_output,
            use_cache: true,
        };
        self.run(&call).await
    }

    /// Answer with per-call overrides
    pub async fn answer_request(&self, request: AnswerRequest) -> Result<Answer> {
        let call = self.resolve(&request);
        self.run(&call).await
    }

    /// Like `answer_request`, but hands back the response as it is generated
    ///
    /// Returns once the model has produced its first piece, so overflow and
    /// transient failures before that are retried exactly as in `answer`.
    pub async fn answer_stream(&self, request: AnswerRequest) -> Result<StreamingAnswer> {
        let call = self.resolve(&request);
        let prepared = self.prepare(&call).await?;
        let max_output = call.max_output;
        let completion = self
            .with_retry(&call, prepared, move |prompt| async move {
                self.open_stream(&prompt, max_output).await
            })
            .await?;

        let ((first, rest), partial) = into_answer(completion);
        let head = (!first.is_empty()).then_some(Ok(first));
        let pieces = futures_stream::iter(head)
            .chain(bounded(rest, self.settings.model_timeout))
            .boxed();

        Ok(StreamingAnswer { pieces, partial })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &Arc<RetrievalCache> {
        &self.cache
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn resolve<'a>(&self, request: &'a AnswerRequest) -> Call<'a> {
        Call {
            query: request.query.trim(),
            history: &request.history,
            top_k: request.top_k.unwrap_or(self.settings.top_k),
            filters: &request.filters,
            budgets: request.budgets.unwrap_or(self.settings.budgets),
            cache_ttl: request.cache_ttl.unwrap_or(self.settings.cache_ttl),
            max_output: request.max_output.unwrap_or(self.settings.max_output),
            use_cache: !request.bypass_cache,
        }
    }

    async fn run(&self, call: &Call<'_>) -> Result<Answer> {
        let prepared = self.prepare(call).await?;
        let max_output = call.max_output;
        let completion = self
            .with_retry(call, prepared, move |prompt| async move {
                self.complete(&prompt, max_output).await
            })
            .await?;

        let (response, answer) = into_answer(completion);
        debug!(
            items_used = answer.items_used.len(),
            prompt_chars = answer.prompt_chars,
            warnings = answer.warnings.len(),
            "answer produced"
        );
        Ok(Answer { response, ..answer })
    }

    /// Validation, retrieval and the first assembly pass
    async fn prepare(&self, call: &Call<'_>) -> Result<Prepared> {
        // Rejected before the cache or index is touched
        if call.query.is_empty() {
            return Err(EngineError::MalformedInput("query is empty".to_string()));
        }
        if call.top_k == 0 {
            return Err(EngineError::MalformedInput(
                "top_k must be at least 1".to_string(),
            ));
        }

        info!(
            top_k = call.top_k,
            history_turns = call.history.len(),
            use_cache = call.use_cache,
            "answering query"
        );

        // Step 1: retrieval, degraded to empty context on failure
        let retrieval = self.retrieve(call).await;

        // Step 2: assembly under the configured budgets
        let assembly =
            self.assembler
                .assemble(&retrieval.items, call.history, call.query, &call.budgets)?;

        Ok(Prepared {
            items: retrieval.items,
            assembly,
            warnings: retrieval.warning.into_iter().collect(),
            cache_hit: retrieval.cache_hit,
            degraded: retrieval.degraded,
        })
    }

    /// Step 3: model call with exactly one retry
    ///
    /// Overflow re-assembles under `Budgets::reduced()`; a timeout or an
    /// unavailable model resends the same prompt.
    async fn with_retry<T, F, Fut>(
        &self,
        call: &Call<'_>,
        prepared: Prepared,
        attempt: F,
    ) -> Result<Completion<T>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, ModelError>>,
    {
        let Prepared {
            items,
            assembly,
            mut warnings,
            cache_hit,
            degraded,
        } = prepared;

        let first = attempt(assembly.text.clone()).await;
        let (output, assembly, retried) = match first {
            Ok(output) => (output, assembly, false),
            Err(ModelError::Overflow { prompt_chars, limit }) => {
                let reduced = call.budgets.reduced();
                warn!(
                    prompt_chars,
                    limit,
                    reduced_total = reduced.total_chars,
                    "model overflow, retrying with reduced budgets"
                );
                warnings.push(TruncationWarning::ReducedBudgetRetry {
                    total_chars: reduced.total_chars,
                });

                let retry = match self
                    .assembler
                    .assemble(&items, call.history, call.query, &reduced)
                {
                    Ok(retry) => retry,
                    Err(EngineError::UnrepresentableInput { .. }) => {
                        warnings.extend(assembly.warnings);
                        return Err(EngineError::ContextDoesNotFit { warnings });
                    }
                    Err(e) => return Err(e),
                };

                let second = attempt(retry.text.clone()).await;
                match second {
                    Ok(output) => (output, retry, true),
                    Err(e) => {
                        warnings.extend(retry.warnings);
                        return Err(terminal_error(e, warnings));
                    }
                }
            }
            Err(e) => {
                warn!("model call failed, retrying once: {}", e);
                warnings.push(TruncationWarning::ModelRetry {
                    reason: e.to_string(),
                });

                let second = attempt(assembly.text.clone()).await;
                match second {
                    Ok(output) => (output, assembly, true),
                    Err(e) => {
                        warnings.extend(assembly.warnings);
                        return Err(terminal_error(e, warnings));
                    }
                }
            }
        };

        Ok(Completion {
            output,
            assembly,
            warnings,
            retried,
            cache_hit,
            degraded,
        })
    }

    /// Cache lookup, then a bounded index search on miss
    ///
    /// Only non-empty successful searches are written back; a bypassed
    /// lookup still refreshes the entry.
    async fn retrieve(&self, call: &Call<'_>) -> Retrieval {
        let key = CacheKey::new(call.query, call.top_k, call.filters);
        if !call.use_cache {
            debug!(key = %key, "retrieval cache bypassed");
        } else if let Some(entry) = self.cache.get(&key) {
            debug!(key = %key, items = entry.items.len(), "retrieval cache hit");
            return Retrieval {
                items: entry.items,
                cache_hit: true,
                degraded: false,
                warning: None,
            };
        }

        let search = timeout(
            self.settings.index_timeout,
            self.index.search(call.query, call.top_k, call.filters),
        )
        .await;

        let reason = match search {
            Ok(Ok(mut hits)) => {
                hits.truncate(call.top_k);
                let items = RetrievedItem::from_hits(hits);
                if items.is_empty() {
                    debug!(key = %key, "index returned no results");
                    return Retrieval {
                        items,
                        cache_hit: false,
                        degraded: true,
                        warning: None,
                    };
                }
                self.cache.put_with_ttl(key, items.clone(), call.cache_ttl);
                return Retrieval {
                    items,
                    cache_hit: false,
                    degraded: false,
                    warning: None,
                };
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!(
                "index search timed out after {}ms",
                self.settings.index_timeout.as_millis()
            ),
        };

        warn!(reason = %reason, "index unavailable, answering without retrieved context");
        Retrieval {
            items: Vec::new(),
            cache_hit: false,
            degraded: true,
            warning: Some(TruncationWarning::IndexUnavailable { reason }),
        }
    }

    /// One bounded model call
    async fn complete(&self, prompt: &str, max_output: usize) -> std::result::Result<String, ModelError> {
        match timeout(self.settings.model_timeout, self.model.complete(prompt, max_output)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                duration_ms: self.settings.model_timeout.as_millis() as u64,
            }),
        }
    }

    /// Open a stream and wait, bounded, for its first piece
    async fn open_stream(
        &self,
        prompt: &str,
        max_output: usize,
    ) -> std::result::Result<(String, TokenStream), ModelError> {
        let deadline = self.settings.model_timeout;
        match timeout(deadline, self.first_piece(prompt, max_output)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                duration_ms: deadline.as_millis() as u64,
            }),
        }
    }

    async fn first_piece(
        &self,
        prompt: &str,
        max_output: usize,
    ) -> std::result::Result<(String, TokenStream), ModelError> {
        let mut pieces = self.model.complete_stream(prompt, max_output).await?;
        match pieces.next().await {
            Some(Ok(first)) => Ok((first, pieces)),
            Some(Err(e)) => Err(e),
            None => Ok((String::new(), pieces)),
        }
    }
}

/// Split a completion into its output and the answer metadata
fn into_answer<T>(completion: Completion<T>) -> (T, Answer) {
    let Completion {
        output,
        assembly,
        mut warnings,
        retried,
        cache_hit,
        degraded,
    } = completion;
    let Assembly {
        prompt,
        warnings: assembly_warnings,
        size_chars,
        estimated_tokens,
        token_upper_bound,
        ..
    } = assembly;
    warnings.extend(assembly_warnings);

    let answer = Answer {
        response: String::new(),
        items_used: prompt.context_block,
        warnings,
        cache_hit,
        degraded,
        retried,
        prompt_chars: size_chars,
        estimated_tokens,
        token_upper_bound,
    };
    (output, answer)
}

/// Remaining pieces, each bounded by `deadline`; the stream ends after an error
fn bounded(rest: TokenStream, deadline: Duration) -> BoxStream<'static, Result<String>> {
    futures_stream::unfold(Some(rest), move |state| async move {
        let Some(mut rest) = state else {
            return None;
        };
        match timeout(deadline, rest.next()).await {
            Ok(Some(Ok(piece))) => Some((Ok(piece), Some(rest))),
            Ok(Some(Err(e))) => Some((Err(terminal_error(e, Vec::new())), None)),
            Ok(None) => None,
            Err(_) => Some((
                Err(EngineError::Timeout {
                    stage: "model".to_string(),
                    duration_ms: deadline.as_millis() as u64,
                }),
                None,
            )),
        }
    })
    .boxed()
}

/// Map a model failure after the retry into the caller-facing error
fn terminal_error(error: ModelError, warnings: Vec<TruncationWarning>) -> EngineError {
    match error {
        ModelError::Overflow { .. } => EngineError::ContextDoesNotFit { warnings },
        ModelError::Timeout { duration_ms } => EngineError::Timeout {
            stage: "model".to_string(),
            duration_ms,
        },
        ModelError::Unavailable(reason) => EngineError::ModelUnavailable(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, SearchHit};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticIndex {
        hits: Vec<SearchHit>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingIndex for StaticIndex {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
            _filters: &Filters,
        ) -> anyhow::Result<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.clone())
        }
    }

    struct ScriptedModel {
        replies: Mutex<Vec<std::result::Result<String, ModelError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(mut replies: Vec<std::result::Result<String, ModelError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(
            &self,
            prompt: &str,
            _max_output: usize,
        ) -> std::result::Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("default".to_string()))
        }
    }

    fn hit(id: &str, text: &str, score: f32) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
            score,
        }
    }

    fn engine(
        hits: Vec<SearchHit>,
        model: Arc<ScriptedModel>,
    ) -> (ContextEngine, Arc<StaticIndex>) {
        let index = Arc::new(StaticIndex {
            hits,
            calls: AtomicUsize::new(0),
        });
        let engine = ContextEngine::new(index.clone(), model, EngineSettings::default());
        (engine, index)
    }

    #[tokio::test]
    async fn test_malformed_input_rejected_before_index() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (engine, index) = engine(vec![hit("d1", "text", 0.9)], model);

        let err = engine.answer("   ", &[], None, &Filters::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));

        let err = engine.answer("q", &[], Some(0), &Filters::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));

        let err = engine.answer_stream(AnswerRequest::new("")).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));

        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.cache_stats().misses, 0);
    }

    #[tokio::test]
    async fn test_second_call_is_cache_hit() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (engine, index) = engine(vec![hit("d1", "attention", 0.9)], model);

        let first = engine.answer("attention", &[], None, &Filters::new()).await.unwrap();
        let second = engine.answer("Attention ", &[], None, &Filters::new()).await.unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.items_used, second.items_used);
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_bypass_searches_again_and_refreshes_entry() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (engine, index) = engine(vec![hit("d1", "attention", 0.9)], model);

        engine.answer("attention", &[], None, &Filters::new()).await.unwrap();
        let fresh = engine
            .answer_request(AnswerRequest::new("attention").with_cache_bypass())
            .await
            .unwrap();

        assert!(!fresh.cache_hit);
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.cache_stats().hits, 0);
        assert_eq!(engine.cache().len(), 1);

        // The refreshed entry serves the next normal call
        let cached = engine.answer("attention", &[], None, &Filters::new()).await.unwrap();
        assert!(cached.cache_hit);
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (engine, index) = engine(vec![], model);

        let answer = engine.answer("q", &[], None, &Filters::new()).await.unwrap();
        assert!(answer.degraded);
        assert!(answer.items_used.is_empty());

        engine.answer("q", &[], None, &Filters::new()).await.unwrap();
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_model_retried_once() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::Unavailable("connection refused".into())),
            Ok("recovered".into()),
        ]));
        let (engine, _) = engine(vec![hit("d1", "text", 0.9)], model.clone());

        let answer = engine.answer("q", &[], None, &Filters::new()).await.unwrap();
        assert_eq!(answer.response, "recovered");
        assert!(answer.retried);
        assert!(answer
            .warnings
            .iter()
            .any(|w| matches!(w, TruncationWarning::ModelRetry { .. })));

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0], prompts[1]);
    }

    #[tokio::test]
    async fn test_second_failure_is_terminal() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::Timeout { duration_ms: 10 }),
            Err(ModelError::Timeout { duration_ms: 10 }),
            Ok("never reached".into()),
        ]));
        let (engine, _) = engine(vec![hit("d1", "text", 0.9)], model.clone());

        let err = engine.answer("q", &[], None, &Filters::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { ref stage, .. } if stage == "model"));
        assert_eq!(model.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_falls_back_to_single_piece() {
        // ScriptedModel keeps the default `complete_stream`
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ModelError::Unavailable("warming up".into())),
            Ok("whole reply".into()),
        ]));
        let (engine, _) = engine(vec![hit("d1", "text", 0.9)], model.clone());

        let mut streaming = engine.answer_stream(AnswerRequest::new("q")).await.unwrap();
        assert!(streaming.partial().retried);
        assert_eq!(streaming.partial().items_used.len(), 1);

        assert_eq!(streaming.next_piece().await.unwrap().unwrap(), "whole reply");
        assert!(streaming.next_piece().await.is_none());

        let answer = streaming.into_answer().await.unwrap();
        assert_eq!(answer.response, "whole reply");
        assert_eq!(model.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_answer_reports_token_estimates() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let (engine, _) = engine(vec![hit("d1", "text", 0.9)], model);

        let answer = engine.answer("q", &[], None, &Filters::new()).await.unwrap();
        assert_eq!(answer.estimated_tokens, (answer.prompt_chars + 3) / 4);
        assert!(answer.token_upper_bound >= answer.estimated_tokens);
    }

    #[test]
    fn test_terminal_error_mapping() {
        assert!(matches!(
            terminal_error(ModelError::Unavailable("x".into()), vec![]),
            EngineError::ModelUnavailable(_)
        ));
        assert!(matches!(
            terminal_error(
                ModelError::Overflow {
                    prompt_chars: 10,
                    limit: 5
                },
                vec![]
            ),
            EngineError::ContextDoesNotFit { .. }
        ));
    }

    #[test]
    fn test_answer_request_builder() {
        let request = AnswerRequest::new("q")
            .with_top_k(3)
            .with_max_output(100)
            .with_cache_ttl(Duration::from_secs(1));
        assert_eq!(request.top_k, Some(3));
        assert_eq!(request.max_output, Some(100));
        assert!(request.budgets.is_none());
        assert!(!request.bypass_cache);
        assert!(request.with_cache_bypass().bypass_cache);
    }
}
