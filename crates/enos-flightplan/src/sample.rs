// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Samples and sample filters.
//!
//! ```hcl
//! sample "nightly" {
//!   attributes = {
//!     aws_region = ["us-east-1", "us-west-2"]
//!   }
//!
//!   subset "upgrade" {
//!     matrix {
//!       backend = ["raft"]
//!     }
//!   }
//!
//!   subset "smoke" {
//!     scenario_filter = "smoke arch:amd64"
//!   }
//! }
//! ```

use enos_hcl::{AttributeSchema, Block, BlockHeaderSchema, BodySchema, Diagnostic, Diagnostics, EvalContext, Value};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::error::{Error, Result};
use crate::flightplan::FlightPlan;
use crate::sample_frame::SampleFrame;
use crate::sample_subset::{BLOCK_TYPE_SAMPLE_SUBSET, SampleSubset, decode_sample_attributes};
use crate::verify::verify_block_labels_are_valid_identifiers;

pub(crate) const BLOCK_TYPE_SAMPLE: &str = "sample";

static SAMPLE_SCHEMA: BodySchema = BodySchema {
    attributes: &[AttributeSchema::optional("attributes")],
    blocks: &[BlockHeaderSchema::new(BLOCK_TYPE_SAMPLE_SUBSET, &["name"])],
};

/// A `sample "<name>"` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    /// Sample name.
    pub name: String,
    /// Attributes shared by every subset. Null when unset.
    pub attributes: Value,
    /// Subsets in declaration order.
    pub subsets: Vec<SampleSubset>,
}

/// Selects which part of a sample to frame and how many elements to observe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFilter {
    /// Name of the sample.
    pub sample: String,
    /// Only these subsets. Empty means every subset.
    #[serde(default)]
    pub subsets: Vec<String>,
    /// Subsets to leave out.
    #[serde(default)]
    pub exclude_subsets: Vec<String>,
    /// Minimum number of elements.
    pub min: u32,
    /// Maximum number of elements. `None` means no upper bound.
    #[serde(default)]
    pub max: Option<u32>,
    /// Upper bound as a percentage of the frame, `0 < pct <= 100`.
    #[serde(default)]
    pub percentage: Option<f32>,
    /// Random seed. Chosen and stored when missing so observations can be
    /// reproduced.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self {
            sample: String::new(),
            subsets: Vec::new(),
            exclude_subsets: Vec::new(),
            min: 1,
            max: None,
            percentage: None,
            seed: None,
        }
    }
}

impl SampleFilter {
    /// A filter for every subset of `sample`.
    pub fn for_sample(sample: impl Into<String>) -> Self {
        Self {
            sample: sample.into(),
            ..Self::default()
        }
    }

    /// Returns a deterministic random source, choosing and storing a seed
    /// when the filter has none.
    pub fn rng(&mut self) -> StdRng {
        let seed = *self.seed.get_or_insert_with(|| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default();
            debug!(seed = now, "no sample seed given, using time derived seed");
            now
        });
        StdRng::seed_from_u64(seed)
    }
}

impl Sample {
    /// Decodes a sample block and its subsets.
    pub fn decode(block: &Block, ctx: &Arc<EvalContext>) -> (Sample, Diagnostics) {
        let mut sample = Sample {
            name: block.labels.first().cloned().unwrap_or_default(),
            ..Sample::default()
        };

        let (content, mut diags) = block.body.content(&SAMPLE_SCHEMA);
        if diags.has_errors() {
            return (sample, diags);
        }

        let (attrs, more) = decode_sample_attributes(content.attribute("attributes"), ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (sample, diags);
        }
        sample.attributes = attrs;

        let subsets = content.blocks_of_type(BLOCK_TYPE_SAMPLE_SUBSET);
        if subsets.is_empty() {
            diags.push(
                Diagnostic::error(
                    "sample does not contain any defined subsets",
                    "a sample must contain one-or-more subsets",
                )
                .with_subject(&block.type_range)
                .with_context(&block.def_range),
            );
            return (sample, diags);
        }

        let mut names = BTreeSet::new();
        for subset_block in subsets {
            let more = verify_block_labels_are_valid_identifiers(subset_block);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            let (mut subset, more) = SampleSubset::decode(subset_block, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (sample, diags);
            }

            if !names.insert(subset.name.clone()) {
                diags.push(
                    Diagnostic::error(
                        "a subset with the same name has already been declared",
                        format!("A subset with the name {} has already been defined", subset.name),
                    )
                    .with_subject(&subset_block.def_range)
                    .with_context(&subset_block.type_range),
                );
                return (sample, diags);
            }

            subset.sample_name = sample.name.clone();
            sample.subsets.push(subset);
        }

        (sample, diags)
    }

    /// The subsets selected by `filter`, sorted by name.
    pub fn filter_subsets(&self, filter: &SampleFilter) -> Vec<&SampleSubset> {
        let mut subsets: Vec<&SampleSubset> = self
            .subsets
            .iter()
            .filter(|s| filter.subsets.is_empty() || filter.subsets.contains(&s.name))
            .filter(|s| !filter.exclude_subsets.contains(&s.name))
            .collect();
        subsets.sort_by(|a, b| a.name.cmp(&b.name));
        subsets
    }

    /// Frames the sample against the scenarios of `fp`.
    pub fn frame(&self, fp: &FlightPlan, filter: &SampleFilter) -> Result<SampleFrame> {
        let subsets = self.filter_subsets(filter);
        if subsets.is_empty() {
            return Err(Error::Sampling(format!(
                "no subsets matched the given filter: sample {} subsets [{}] exclude [{}]",
                filter.sample,
                filter.subsets.join(", "),
                filter.exclude_subsets.join(", ")
            )));
        }

        let mut subset_frames = BTreeMap::new();
        for subset in subsets {
            let frame = subset.frame(fp)?;
            subset_frames.insert(subset.name.clone(), frame);
        }

        Ok(SampleFrame {
            sample: self.clone(),
            filter: filter.clone(),
            subset_frames,
        })
    }
}
