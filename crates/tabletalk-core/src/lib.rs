//! Tabletalk Core - Natural-Language Questions over Tabular Data
//!
//! This crate is the translate-execute-retry core: a question comes
//! in, gets classified as a data request or a chart request, and is
//! translated by a language model into either a SQL query or a chart
//! program. Execution failures feed back into the next generation
//! attempt until the attempt budget is spent.
//!
//! # Architecture
//!
//! ```text
//!  question
//!     │
//!     ▼
//!  IntentClassifier ──── LanguageModel
//!     │
//!     ├─ DATA ──► QueryGenerator ──► TabularStore ──┐
//!     │              ▲                              │ retry on failure
//!     │              └──────── last error ◄─────────┘
//!     │
//!     └─ CHART ─► (data sub-loop as above, non-empty result required)
//!                    │
//!                    ▼
//!                 ChartCodeGenerator ──► ChartSandbox ──┐
//!                    ▲                                  │
//!                    └──────────── last error ◄─────────┘
//!     │
//!     ▼
//!  ResultEnvelope (Data | Chart | Error | Unknown)
//! ```
//!
//! The store and the sandbox are collaborators behind traits; the
//! engine owns the loop, the budget and the envelope packaging, and
//! its `process` entry point never raises.

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod generate;
pub mod llm;
pub mod types;

pub use classifier::IntentClassifier;
pub use config::EngineConfig;
pub use engine::{ChartSandbox, Engine, TabularStore, ATTEMPT_BUDGET, DEFAULT_SAMPLE_ROWS};
pub use error::{EngineError, LlmError, Result, SandboxError, StoreError};
pub use generate::{
    strip_code_fences, ChartCodeGenerator, QueryGenerator, CHART_BINDING, SCHEMA_SUMMARY,
    TABLE_BINDING,
};
pub use llm::{LanguageModel, LlmModel, OpenRouterClient};
pub use types::{ChartSpec, Intent, ResultEnvelope, Scalar, TabularResult};
