//! # Vigil - Detection Engine
//!
//! Server-side anti-cheat for multiplayer game servers. The host feeds
//! per-player telemetry; independent statistical checks score it; a decaying
//! violation ledger turns scores into report and punish verdicts; levels are
//! replicated across server instances through a shared store.
//!
//! ## Architecture
//!
//! ```text
//!  host adapter                       DetectionEngine
//! ┌────────────┐  RawSample  ┌────────────┐  Event  ┌────────┐  Score
//! │ packets,   │ ──────────► │ Normalizer │ ──────► │ Checks │ ──────┐
//! │ join/leave │             └────────────┘         └────────┘       ▼
//! └────────────┘                                               ┌──────────┐
//!       ▲            Verdict (T1 flagged / T2 punish)          │  Ledger  │
//!       └──────────── VerdictSink ◄─── transitions ◄────────── │ (decay)  │
//!                     (+ AuditLog)                             └──────────┘
//!                                                                   │ ▲
//!                                                  publish (queue)  ▼ │ merge
//!                                                              ClusterSync
//! ```
//!
//! ## Guarantees
//!
//! - `process` never waits on the store or on disk
//! - A failing or panicking check never stops the other checks
//! - Store outages degrade to local-only detection
//! - A single outlier never produces a verdict: every check needs
//!   `min_samples` observations and the ledger needs sustained evidence
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil::{ChannelSink, DetectionEngine, EngineConfig};
//! use vigil_shared::{PlayerId, RawSample, Timestamp};
//!
//! let (sink, verdicts) = ChannelSink::new(1_024);
//! let engine = DetectionEngine::builder(EngineConfig::default())
//!     .with_sink(Arc::new(sink))
//!     .build()?;
//!
//! engine.player_joined(PlayerId(7), Timestamp(0));
//! engine.ingest(&RawSample::attack(PlayerId(7), Timestamp(50), 2.9, 40.0))?;
//! for message in verdicts.try_iter() {
//!     println!("{:?} {}", message.kind, message.verdict.player);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod sink;

pub use config::{EngineConfig, SessionConfig};
pub use engine::{DetectionEngine, EngineBuilder, EngineStats, ProcessReport, SweepSummary};
pub use error::{EngineError, EngineResult};
pub use sink::{ChannelSink, VerdictKind, VerdictMessage};

pub use vigil_audit::{AuditConfig, AuditLog};
pub use vigil_cluster::{ClusterStore, MemoryClusterStore, SyncConfig};
pub use vigil_detection::{Check, CheckState, DetectionConfig, ReplayConfig, Score, ViolationRecord, ViolationState};
