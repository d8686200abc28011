//! Redpen - chunked, resumable LLM review of LaTeX documents.
//!
//! Redpen walks a LaTeX document and everything it pulls in with
//! `\input{...}`, cuts the text into line-numbered chunks that fit a token
//! budget, and feeds them one at a time to a chat model for writing
//! feedback. Traversal state is an explicit stack of open documents, so a
//! review can stop after any chunk and resume exactly where it left off.
//!
//! # Quick Start
//!
//! ```no_run
//! use redpen::builder::Traversal;
//!
//! for chunk in Traversal::new("thesis/main.tex").max_tokens(2048).build().unwrap() {
//!     let chunk = chunk.unwrap();
//!     print!("{}", chunk.body);
//!     println!("resume at {} (partial: {})", chunk.state, chunk.partial);
//! }
//! ```
//!
//! # Modules
//!
//! - [`reader`] - Line-numbered reading with comment and blank filtering
//! - [`tokens`] - Unit estimates and budget metering
//! - [`include`] - `\input{...}` recognition
//! - [`engine`] - The resumable traversal step function
//! - [`builder`] - Fluent setup and chunk iteration
//! - [`review`] - Review modes and request framing
//! - [`client`] - Chat-completion transport
//! - [`pricing`] - Model prices and cost tracking
//! - [`session`] - The interactive review loop
//! - [`output`] - Wrapping and status rendering

pub mod errors;
pub mod tokens;
pub mod reader;
pub mod include;
pub mod engine;
pub mod builder;
pub mod review;
pub mod client;
pub mod pricing;
pub mod session;
pub mod output;

// Re-export key types at crate root for convenience
pub use builder::{Chunks, Traversal};
pub use client::{ChatBackend, Completion, Message, OpenAiClient, Role, Usage};
pub use engine::{Chunk, Engine, EngineOptions, Frame, Position, TraversalState};
pub use errors::RedpenError;
pub use pricing::{CostLedger, ModelPrice, PriceTable};
pub use review::ReviewMode;
pub use session::{Outcome, Session, SessionConfig};
pub use tokens::{estimate_units, BudgetMeter, Encoding};
