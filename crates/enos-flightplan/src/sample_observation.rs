// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sample observations.

use enos_hcl::Diagnostics;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::decoder::DecodeTarget;
use crate::error::{Error, Result, check};
use crate::sample::SampleFilter;
use crate::sample_frame::{SampleElement, SampleFrame};
use crate::sample_funcs::SampleFunc;
use crate::sample_subset_frame::SampleSubsetObservation;
use crate::workspace::Workspace;

/// The result of applying a [`SampleFunc`] to a [`SampleFrame`].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleObservation {
    /// The observed frame.
    pub frame: SampleFrame,
    /// Observations keyed by subset name.
    pub subset_observations: BTreeMap<String, SampleSubsetObservation>,
}

impl SampleObservation {
    /// Number of observed elements.
    pub fn size(&self) -> usize {
        self.subset_observations.values().map(SampleSubsetObservation::size).sum()
    }

    /// Expands every subset observation into elements with attributes.
    ///
    /// Elements are sorted by sample, subset and scenario filter.
    pub fn elements<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<SampleElement>> {
        let mut elements = Vec::new();
        for (name, obs) in &self.subset_observations {
            let more = self
                .frame
                .elements(name, rng, obs.matrix.as_ref())
                .map_err(|e| Error::Sampling(format!("attemping to get elements from subset {}: {}", name, e)))?;
            elements.extend(more);
        }

        elements.sort_by(|a, b| {
            a.sample
                .cmp(&b.sample)
                .then_with(|| a.subset.cmp(&b.subset))
                .then_with(|| a.scenario.filter.cmp(&b.scenario.filter))
        });

        Ok(elements)
    }
}

/// A request to observe a sample of a workspace.
#[derive(Debug, Clone)]
pub struct SampleObservationReq {
    /// The flight plan to sample.
    pub workspace: Workspace,
    /// What to sample.
    pub filter: SampleFilter,
    /// How to sample.
    pub func: SampleFunc,
}

/// The response to a [`SampleObservationReq`].
#[derive(Debug, Clone, Serialize)]
pub struct SampleObservationResponse {
    /// The filter, with the seed that was used.
    pub filter: SampleFilter,
    /// Observed elements.
    pub elements: Vec<SampleElement>,
    /// Non-fatal decode diagnostics.
    #[serde(skip_serializing_if = "Diagnostics::is_empty")]
    pub diagnostics: Diagnostics,
}

impl SampleObservationReq {
    /// A purposive stratified observation request.
    pub fn new(workspace: Workspace, filter: SampleFilter) -> Result<Self> {
        if filter.sample.is_empty() {
            return Err(Error::Sampling(
                "cannot sample without a sample name in the filter".to_string(),
            ));
        }
        Ok(Self {
            workspace,
            filter,
            func: SampleFunc::default(),
        })
    }

    /// Uses `func` instead of the default sampling function.
    pub fn with_func(mut self, func: SampleFunc) -> Self {
        self.func = func;
        self
    }

    /// Decodes the workspace, frames the sample and observes it.
    pub fn observe(mut self) -> Result<SampleObservationResponse> {
        let (fp, diags) = self
            .workspace
            .decoder()?
            .with_target(DecodeTarget::Samples)
            .decode();
        let diags = check(diags)?;

        let Some(sample) = fp.find_sample(&self.filter.sample) else {
            return Err(Error::Sampling(format!(
                "no sample named {} has been defined",
                self.filter.sample
            )));
        };

        let mut rng = self.filter.rng();
        let frame = sample.frame(&fp, &self.filter)?;
        let observation = self.func.observe(&frame, &mut rng)?;
        let elements = observation.elements(&mut rng)?;

        info!(
            sample = %self.filter.sample,
            func = %self.func,
            seed = ?self.filter.seed,
            frame_size = frame.size(),
            elements = elements.len(),
            "observed sample"
        );

        Ok(SampleObservationResponse {
            filter: self.filter,
            elements,
            diagnostics: diags,
        })
    }
}
