//! Translation between the `OpenAI` chat dialect and the Cloud Code Assist
//! internal API.
//!
//! Everything here is pure: request translation with tool-call pairing
//! validation, JSON Schema reduction, model normalization, envelope
//! handling, and the classify/render halves of the streaming pipeline.

pub mod codeassist_to_openai;
pub mod envelope;
pub mod model;
pub mod openai_to_codeassist;
pub mod schema;
pub mod sse;
pub mod stream;

pub use codeassist_to_openai::CodeAssistToOpenAI;
pub use model::{Matcher, ModelRule, ModelRules};
pub use openai_to_codeassist::{OpenAIToCodeAssist, UpstreamRequest, to_upstream};
pub use sse::{NativeSseRenderer, OpenAISseRenderer, Render};
pub use stream::{Classify, EnvelopeClassifier, EventClassifier, StreamEvent, Usage};
