// Context retrieval and assembly engine
//
// Ties the retrieval cache, the embedding index, the context assembler and
// the language model together behind a single `answer` operation.
//
// Components:
// - ContextEngine: cache lookup, bounded search, assembly, one model retry
// - AnswerRequest: per-call overrides of the engine settings
// - Answer: response plus the items and warnings that shaped it
// - StreamingAnswer: the same, with the response arriving piece by piece

pub mod pipeline;

// Re-export key types
pub use pipeline::{Answer, AnswerRequest, ContextEngine, EngineSettings, StreamingAnswer};
