//! # kiln
//!
//! A message-driven async runtime around a native LLM inference backend.
//!
//! Every native handle lives on one dedicated worker thread; callers hold
//! a cheap, clonable [`Client`] and speak to the worker through correlated
//! control/response messages. Per context, the worker maintains the token
//! buffer, the per-token logits buffer, and the native KV cache in strict
//! consistency across edits, ingests batched prompt prefills, and streams
//! generated tokens through a caller-supplied [`SamplerChain`].
//!
//! ```no_run
//! use kiln::{Client, ContextParams, Greedy, ModelParams, SamplerChain};
//!
//! # async fn demo() -> Result<(), kiln::Error> {
//! let (client, worker) = Client::start().await?;
//! let model = client.load_model("weights.gguf", &ModelParams::default()).await?;
//! let ctx = client.new_context(model, &ContextParams::default()).await?;
//!
//! client.tokenize(ctx, "The capital of France is").await?;
//! let (ingest, _cancel) = client.ingest(ctx).await?;
//! ingest.wait().await?;
//!
//! let (stream, _cancel) = client.generate(ctx, SamplerChain::new().with(Greedy)).await?;
//! println!("{}", stream.collect_text().await?);
//!
//! client.free_context(ctx).await?;
//! client.free_model(model).await?;
//! client.shutdown().await?;
//! worker.join();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod native;
pub mod sampler;
pub mod telemetry;
pub mod token;

pub(crate) mod worker;

pub use client::{CancelHandle, Client, IngestOp, TokenStream};
pub use config::{ContextParams, ModelParams, DEFAULT_SEED};
pub use error::Error;
pub use sampler::{
    Dist, Greedy, RepetitionPenalty, Sampler, SamplerChain, SamplingOptions, Temperature, TopK,
    TopP,
};
pub use token::{Token, TokenId};
pub use worker::message::{ContextHandle, FinishReason, ModelHandle, Outcome, RequestId, Tokenized};
pub use worker::WorkerHandle;
