//! Upstream access for the Cloud Code Assist API.
//!
//! [`CodeAssistClient`] sends enveloped requests with managed credentials,
//! [`pipeline`] re-frames streamed replies for the client, and
//! [`discovery`] resolves the tenant id at startup.

pub mod client;
pub mod discovery;
pub mod pipeline;

pub use client::{Action, CodeAssistClient, byte_stream};
pub use discovery::{OnboardPolicy, discover, discover_with};
pub use pipeline::PipelineOptions;
