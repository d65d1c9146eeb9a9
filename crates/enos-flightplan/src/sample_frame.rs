// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sample frames.
//!
//! A frame is a sample whose subsets have been resolved against the flight
//! plan's scenarios. Frames are what the sampling functions observe.

use enos_hcl::Value;
use enos_hcl::functions::value_to_json;
use enos_hcl::value::canonical_cmp;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::matrix::{Matrix, Vector};
use crate::sample::{Sample, SampleFilter};
use crate::sample_subset::sample_attr_values;
use crate::sample_subset_frame::SampleSubsetFrame;
use crate::scenario::{Scenario, ScenarioRef};

/// A sample with its subsets framed.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    /// The framed sample.
    pub sample: Sample,
    /// Filter used to build the frame.
    pub filter: SampleFilter,
    /// Subset frames keyed by subset name.
    pub subset_frames: BTreeMap<String, SampleSubsetFrame>,
}

/// One observed element: a scenario instance with its assigned attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleElement {
    /// Sample name.
    pub sample: String,
    /// Subset name.
    pub subset: String,
    /// The scenario instance.
    pub scenario: ScenarioRef,
    /// Attributes assigned to the element.
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl SampleFrame {
    /// Total number of elements across all subset frames.
    pub fn size(&self) -> usize {
        self.subset_frames.values().map(SampleSubsetFrame::size).sum()
    }

    /// Subset names, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.subset_frames.keys().cloned().collect()
    }

    /// Fails unless there is at least one subset frame and every subset
    /// frame is valid.
    pub fn validate(&self) -> Result<()> {
        if self.subset_frames.is_empty() {
            return Err(Error::Sampling("sample frame does not have any subsets".to_string()));
        }

        let errs: Vec<String> = self
            .subset_frames
            .values()
            .filter_map(|f| f.validate().err())
            .map(|e| e.to_string())
            .collect();
        if errs.is_empty() {
            return Ok(());
        }

        Err(Error::Sampling(errs.join("\n")))
    }

    /// Resolves the filter's bounds against the frame size.
    ///
    /// Returns `(min, max)` where `max` never exceeds the frame size.
    pub fn filter_min_max(&self) -> Result<(usize, usize)> {
        let size = self.size();
        let min = self.filter.min as usize;
        if min > size {
            return Err(Error::Sampling(format!(
                "minimum requested frame size {} is larger than total frame size {}",
                min, size
            )));
        }

        let mut max = self.filter.max.map_or(size, |m| (m as usize).min(size));

        if let Some(pct) = self.filter.percentage.filter(|p| *p > 0.0) {
            let pct_max = ((pct as f64 / 100.0) * size as f64).round() as usize;
            max = max.min(pct_max);
        }

        Ok((min, max))
    }

    /// Validates the frame against its filter. Returns true if the whole frame
    /// should be returned.
    pub fn filter_validate(&self) -> Result<bool> {
        self.validate()?;
        let (_, max) = self.filter_min_max()?;
        Ok(max == self.size())
    }

    /// Expands the elements of one subset frame and assigns their attributes.
    ///
    /// When `matrix` is given only the frame's vectors that intersect it are
    /// returned, otherwise the whole subset frame is.
    pub fn elements<R: Rng + ?Sized>(
        &self,
        subset_name: &str,
        rng: &mut R,
        matrix: Option<&Matrix>,
    ) -> Result<Vec<SampleElement>> {
        let Some(subset_frame) = self.subset_frames.get(subset_name) else {
            return Err(Error::Sampling(format!("no subset frame with name {}", subset_name)));
        };

        let mut vals = sample_attr_values(&self.sample.attributes)?;
        // Subset values take precedence over the sample's.
        vals.extend(sample_attr_values(&subset_frame.subset.attributes)?);

        let scenario_name = subset_frame.scenario_filter.name.clone().unwrap_or_default();
        let element = |variants: Vector| SampleElement {
            sample: self.sample.name.clone(),
            subset: subset_frame.subset.name.clone(),
            scenario: Scenario {
                name: scenario_name.clone(),
                variants,
                ..Scenario::default()
            }
            .reference(),
            attributes: serde_json::Map::new(),
        };

        let mut elements: Vec<SampleElement> = match (&subset_frame.matrix, matrix) {
            (None, Some(m)) => {
                return Err(Error::Sampling(format!(
                    "frame for subset {} has no matrix but requested elements for {}",
                    subset_name, m
                )));
            }
            (None, None) => vec![element(Vector::new())],
            (Some(frame_matrix), None) => frame_matrix.vectors().iter().cloned().map(element).collect(),
            (Some(frame_matrix), Some(m)) => m
                .intersection_contains_unordered(frame_matrix)
                .unwrap_or_default()
                .into_vectors()
                .into_iter()
                .map(element)
                .collect(),
        };

        expand_element_attrs(&mut elements, &vals, rng)?;
        Ok(elements)
    }
}

/// Assigns attributes to elements. Single values go to every element. The
/// members of collection values are spread evenly across elements in a
/// random but seed determined order.
fn expand_element_attrs<R: Rng + ?Sized>(
    elements: &mut [SampleElement],
    vals: &BTreeMap<String, Value>,
    rng: &mut R,
) -> Result<()> {
    if vals.is_empty() || elements.is_empty() {
        return Ok(());
    }

    for (key, val) in vals {
        if !val.can_iterate_elements() {
            let json = value_to_json(val);
            for elm in elements.iter_mut() {
                elm.attributes.insert(key.clone(), json.clone());
            }
            continue;
        }

        let mut members: Vec<Value> = match val.as_value_slice() {
            Some(members) => members.to_vec(),
            None => match val.as_value_map() {
                Some(map) => map.values().cloned().collect(),
                None => continue,
            },
        };
        if members.is_empty() {
            continue;
        }
        members.sort_by(canonical_cmp);

        let mut next = rng.gen_range(0..members.len());
        let mut idxs = Vec::with_capacity(elements.len());
        for _ in 0..elements.len() {
            idxs.push(next);
            next = (next + 1) % members.len();
        }
        idxs.shuffle(rng);

        for (elm, idx) in elements.iter_mut().zip(idxs) {
            elm.attributes.insert(key.clone(), value_to_json(&members[idx]));
        }
    }

    Ok(())
}
