//! # truss_core - Truss Skeleton to Timber Connector Pipeline
//!
//! `truss_core` turns a line-segment skeleton of a timber truss into the
//! fabrication data for its joints: a node/edge network, a connector
//! archetype per node, load-engineered rod counts and block sizes, half-lap
//! cuts where beams cross, connector voids, plywood connector panels, and
//! solid construction requests for a modeling host.
//!
//! ## Design Philosophy
//!
//! - **Staged**: each stage is a pure function from typed input to a fresh
//!   typed output plus a [`report::StageReport`]
//! - **JSON-First**: every stage output serializes to an artifact so stages
//!   can also run as separate batch invocations
//! - **Partial results, never silent**: per-item failures are skipped and
//!   counted, stage-level failures abort
//!
//! ## Quick Start
//!
//! ```rust
//! use truss_core::config::PipelineConfig;
//! use truss_core::fixtures::spider_truss_lines;
//! use truss_core::pipeline::run_pipeline;
//!
//! let outputs = run_pipeline(&spider_truss_lines(), None, &PipelineConfig::default()).unwrap();
//! assert_eq!(outputs.network.edge_count(), 12);
//! assert_eq!(outputs.connectors.total_rods(), 38);
//! ```
//!
//! ## Modules
//!
//! - [`network`] - Line segments to a deduplicated node/edge graph
//! - [`joints`] - Degree-based connector archetypes
//! - [`engineering`] - Load-driven rod counts and block sizes
//! - [`half_lap`] - Beam-pair overlap and half-lap cut sizing
//! - [`voids`] - Connector pockets in the beams
//! - [`panels`] - Crossed plywood panels with rod holes and beam pockets
//! - [`emitter`] - Solid construction requests and geometry sinks
//! - [`export`] - CSV tables
//! - [`artifacts`] / [`file_io`] - Persisted stage outputs, atomic saves
//! - [`pipeline`] - All stages in one call
//! - [`config`] - Pipeline configuration
//! - [`errors`] - Structured error types

pub mod artifacts;
pub mod config;
pub mod emitter;
pub mod engineering;
pub mod errors;
pub mod export;
pub mod file_io;
pub mod fixtures;
pub mod geometry;
pub mod half_lap;
pub mod joints;
pub mod network;
pub mod panels;
pub mod pipeline;
pub mod report;
pub mod voids;

pub use config::PipelineConfig;
pub use errors::{TrussError, TrussResult};
pub use file_io::{load_artifact, save_artifact};
pub use network::{build_network, LineSegment, Network};
pub use pipeline::{run_pipeline, PipelineOutputs};
pub use report::{Stage, StageReport};
