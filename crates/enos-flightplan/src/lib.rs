// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Enos Flight Plan - Scenario Decoding, Expansion and Sampling
//!
//! A flight plan is a directory of `enos*.hcl` files describing modules,
//! providers, qualities, samples and scenarios. Scenarios are parameterized by
//! a matrix of variant axes; every vector of the matrix is a scenario
//! instance that can be generated into a Terraform root module.
//!
//! # Architecture
//!
//! ```text
//!   Workspace (raw files, vars, env)
//!        │
//!        ▼
//!   Decoder ── variables ► globals ► modules ► providers ► terraform ► terraform_cli ► quality ► sample
//!        │
//!        ▼
//!   FlightPlan ──► ScenarioDecoder ──► ScenarioStream (concurrent, cancellable)
//!        │                                   │
//!        │                                   ▼
//!        │                              Scenario instances ──► Generator (scenario.tf)
//!        ▼
//!   Sample ──► SampleFrame ──► SampleObservation
//! ```
//!
//! # Decode targets
//!
//! | Target | Produces |
//! |--------|----------|
//! | `variables` .. `qualities` | Top-level records, in stage order |
//! | `samples` | Samples, bound to the flight plan for framing |
//! | `scenarios_names_no_variants` | Scenario names only |
//! | `scenarios_matrix_only` | Filtered matrices, no instances |
//! | `scenarios_names_expand_variants` | Names and variants of every instance |
//! | `scenarios_outlines` | One fully decoded instance per block |
//! | `scenarios_complete` / `all` | Every instance, fully decoded |
//!
//! # Quick start
//!
//! ```ignore
//! use enos_flightplan::{DecodeTarget, ScenarioFilter, Workspace};
//!
//! let ws = Workspace::load("./enos")?;
//! let (fp, diags) = ws
//!     .decoder()?
//!     .with_target(DecodeTarget::All)
//!     .with_filter(ScenarioFilter::parse(&["upgrade", "arch:arm64"])?)
//!     .decode_all()
//!     .await;
//! for scenario in fp.scenarios() {
//!     println!("{}", scenario);
//! }
//! ```

#![deny(missing_docs)]

/// Decoder tuning from the environment.
pub mod config;

/// Flight plan decoding in stages.
pub mod decoder;

/// Error types.
pub mod error;

/// Flight plan file discovery.
pub mod file_finder;

/// The decoded flight plan.
pub mod flightplan;

/// Terraform root module generation.
pub mod generate;

/// Variant vectors and matrices.
pub mod matrix;

/// `matrix` block decoding.
pub mod matrix_decoder;

/// `module` blocks.
pub mod module;

/// `provider` blocks.
pub mod provider;

/// `quality` blocks.
pub mod quality;

/// `sample` blocks and sample filters.
pub mod sample;

/// The sampling frame of a sample.
pub mod sample_frame;

/// Sampling functions.
pub mod sample_funcs;

/// Sample observation.
pub mod sample_observation;

/// `subset` blocks of a sample.
pub mod sample_subset;

/// The frame of a single subset.
pub mod sample_subset_frame;

/// Sample validation.
pub mod sample_validation;

/// Scenario instances.
pub mod scenario;

/// Scenario block expansion.
pub mod scenario_decoder;

/// Scenario filters.
pub mod scenario_filter;

/// Scenario `output` blocks.
pub mod scenario_output;

/// Scenario `step` blocks.
pub mod scenario_step;

/// Blocks without a fixed schema.
pub mod schemaless_block;

/// Step variables and their capsule encoding.
pub mod step_variable;

/// `terraform_cli` blocks.
pub mod terraform_cli;

/// `terraform` setting blocks.
pub mod terraform_setting;

/// SSH transport of the enos provider.
pub mod transport;

/// `variable` blocks and variable inputs.
pub mod variable;

mod verify;

/// Workspaces.
pub mod workspace;

pub use config::{Config, ConfigError};
pub use decoder::{DecodeTarget, Decoder};
pub use error::{Error, Result};
pub use flightplan::FlightPlan;
pub use generate::{GenerateReq, GeneratedModule, Generator};
pub use matrix::{Element, Exclude, ExcludeMode, Matrix, Vector};
pub use sample::{Sample, SampleFilter};
pub use sample_frame::{SampleElement, SampleFrame};
pub use sample_funcs::SampleFunc;
pub use sample_observation::{SampleObservation, SampleObservationReq, SampleObservationResponse};
pub use sample_validation::SampleValidationReq;
pub use scenario::{Scenario, ScenarioOutline, ScenarioRef};
pub use scenario_decoder::{ScenarioBlock, ScenarioDecoder, ScenarioStream};
pub use scenario_filter::ScenarioFilter;
pub use workspace::Workspace;
