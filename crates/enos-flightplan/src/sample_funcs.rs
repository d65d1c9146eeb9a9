// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sampling functions.
//!
//! A sampling function turns a [`SampleFrame`] into a [`SampleObservation`].
//! [`SampleFunc::PurposiveStratified`] first gives every subset one element,
//! then allocates the rest proportionally to subset size, and hands out any
//! rounding remainder to the subsets with the most room left.

use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sample_frame::SampleFrame;
use crate::sample_observation::SampleObservation;
use crate::sample_subset_frame::SampleSubsetObservation;

/// The available sampling functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleFunc {
    /// Every element of the frame. The filter must allow the whole frame.
    All,
    /// Purposive coverage of each subset followed by stratified allocation.
    #[default]
    PurposiveStratified,
}

impl FromStr for SampleFunc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(SampleFunc::All),
            "purposive_stratified" | "purposive-stratified" => Ok(SampleFunc::PurposiveStratified),
            other => Err(Error::Sampling(format!("unknown sampling function: {}", other))),
        }
    }
}

impl fmt::Display for SampleFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFunc::All => f.write_str("all"),
            SampleFunc::PurposiveStratified => f.write_str("purposive_stratified"),
        }
    }
}

impl SampleFunc {
    /// Observes `frame`.
    pub fn observe<R: Rng + ?Sized>(&self, frame: &SampleFrame, rng: &mut R) -> Result<SampleObservation> {
        match self {
            SampleFunc::All => observe_all(frame),
            SampleFunc::PurposiveStratified => observe_purposive_stratified(frame, rng),
        }
    }
}

fn observe_all(frame: &SampleFrame) -> Result<SampleObservation> {
    if !frame.filter_validate()? {
        return Err(Error::Sampling(
            "filter is incompatible with returning all".to_string(),
        ));
    }

    let subset_observations = frame
        .subset_frames
        .iter()
        .map(|(name, sub)| {
            (
                name.clone(),
                SampleSubsetObservation {
                    frame: sub.clone(),
                    matrix: sub.matrix.clone(),
                },
            )
        })
        .collect();

    Ok(SampleObservation {
        frame: frame.clone(),
        subset_observations,
    })
}

fn observe_purposive_stratified<R: Rng + ?Sized>(frame: &SampleFrame, rng: &mut R) -> Result<SampleObservation> {
    if frame.filter_validate()? {
        return observe_all(frame);
    }

    let (min, max) = frame.filter_min_max()?;

    let mut specs: Vec<SubsetSpec> = frame
        .subset_frames
        .iter()
        .map(|(name, sub)| SubsetSpec {
            name: name.clone(),
            space: sub.size(),
            taken: 0,
        })
        .collect();
    allocate_purposive_stratified(&mut specs, max, rng)?;

    debug!(
        sample = %frame.sample.name,
        take = max,
        allocation = ?specs.iter().map(|s| (s.name.as_str(), s.taken)).collect::<Vec<_>>(),
        "allocated purposive stratified sample"
    );

    sort_by_taken(&mut specs);
    let mut subset_observations = BTreeMap::new();
    for spec in specs.iter().filter(|s| s.taken > 0) {
        let Some(sub) = frame.subset_frames.get(&spec.name) else {
            return Err(Error::Sampling(format!(
                "expected to sample from frame {} but it was not found in frame",
                spec.name
            )));
        };
        subset_observations.insert(spec.name.clone(), sub.observe_simple_random(spec.taken, rng)?);
    }

    let observation = SampleObservation {
        frame: frame.clone(),
        subset_observations,
    };

    if observation.size() < min {
        return Err(Error::Sampling(format!(
            "sample observation size of {} does not satisfy minimum requirement: {}",
            observation.size(),
            min
        )));
    }

    Ok(observation)
}

/// How many elements to take from a subset.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubsetSpec {
    name: String,
    space: usize,
    taken: usize,
}

impl SubsetSpec {
    fn take(&mut self, n: usize) -> Result<()> {
        if self.space < n {
            return Err(Error::Sampling(format!(
                "cannot allocate {} in subset {}, space remaining: {}",
                n, self.name, self.space
            )));
        }
        self.taken += n;
        self.space -= n;
        Ok(())
    }

    fn size(&self) -> usize {
        self.space + self.taken
    }
}

// Most remaining space first, then by name.
fn sort_by_space(specs: &mut [SubsetSpec]) {
    specs.sort_by(|a, b| b.space.cmp(&a.space).then_with(|| a.name.cmp(&b.name)));
}

fn sort_by_taken(specs: &mut [SubsetSpec]) {
    specs.sort_by(|a, b| b.taken.cmp(&a.taken).then_with(|| a.name.cmp(&b.name)));
}

fn allocate_purposive_stratified<R: Rng + ?Sized>(specs: &mut [SubsetSpec], take: usize, rng: &mut R) -> Result<()> {
    if specs.is_empty() {
        return Ok(());
    }

    sort_by_space(specs);
    let purposive = take.min(specs.len());

    // One element for as many subsets as we can afford.
    for idx in rand::seq::index::sample(rng, specs.len(), purposive) {
        specs[idx].take(1)?;
    }

    if take == purposive {
        return Ok(());
    }

    let remain = allocate_stratified(specs, take - purposive)?;
    if remain == 0 {
        return Ok(());
    }

    allocate_cap_space(specs, remain)
}

/// Allocates `take` in proportion to subset size. Returns what rounding left
/// unallocated.
fn allocate_stratified(specs: &mut [SubsetSpec], take: usize) -> Result<usize> {
    if specs.is_empty() || take == 0 {
        return Ok(0);
    }

    let frame_size: usize = specs.iter().map(SubsetSpec::size).sum();
    let remaining_space: usize = specs.iter().map(|s| s.space).sum();
    if take > remaining_space {
        return Err(Error::Sampling(format!(
            "cannot take {} from {} subsets with {} space remaining to allocate",
            take,
            specs.len(),
            remaining_space
        )));
    }

    sort_by_space(specs);
    let mut took = 0usize;
    for spec in specs.iter_mut() {
        let share = (take as f64 * (spec.size() as f64 / frame_size as f64)).round() as i64;
        if share < 1 {
            continue;
        }

        // Never over-represent the subset or exceed what is left to take.
        let can_take = spec.space as i64 - share;
        let mut sub_take = share.min(can_take);
        sub_take = sub_take.min((take - took) as i64);
        if sub_take < 1 {
            continue;
        }

        spec.take(sub_take as usize)?;
        took += sub_take as usize;
        if took >= take {
            return Ok(0);
        }
    }

    Ok(take - took)
}

fn allocate_cap_space(specs: &mut [SubsetSpec], mut take: usize) -> Result<()> {
    while take > 0 {
        sort_by_space(specs);
        for spec in specs.iter_mut() {
            if spec.space == 0 {
                return Err(Error::Sampling("unable to allocate subset elements".to_string()));
            }
            spec.take(1)?;
            take -= 1;
            if take == 0 {
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{Matrix, Vector};
    use crate::sample::{Sample, SampleFilter};
    use crate::sample_subset::SampleSubset;
    use crate::sample_subset_frame::SampleSubsetFrame;
    use crate::scenario_filter::ScenarioFilter;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn frame(sizes: &[(&str, usize)], filter: SampleFilter) -> SampleFrame {
        SampleFrame {
            sample: Sample {
                name: "smp".into(),
                ..Sample::default()
            },
            filter,
            subset_frames: sizes
                .iter()
                .map(|(name, size)| {
                    (
                        name.to_string(),
                        SampleSubsetFrame {
                            subset: SampleSubset {
                                name: name.to_string(),
                                sample_name: "smp".into(),
                                ..SampleSubset::default()
                            },
                            scenario_filter: ScenarioFilter::with_name(*name),
                            matrix: Some(Matrix::from_vectors(
                                (0..*size).map(|i| Vector::from_pairs([("idx", i.to_string())])),
                            )),
                        },
                    )
                })
                .collect(),
        }
    }

    fn sizes(obs: &SampleObservation) -> BTreeMap<String, usize> {
        obs.subset_observations
            .iter()
            .map(|(k, v)| (k.clone(), v.size()))
            .collect()
    }

    #[test]
    fn test_purposive_stratified_rounding() {
        let f = frame(
            &[("foo", 6), ("bar", 4), ("baz", 1), ("baz_alias", 1)],
            SampleFilter {
                min: 1,
                max: None,
                percentage: Some(78.0),
                ..SampleFilter::for_sample("smp")
            },
        );

        for seed in [78910, 1, 42] {
            let mut rng = StdRng::seed_from_u64(seed);
            let obs = SampleFunc::PurposiveStratified.observe(&f, &mut rng).unwrap();
            assert_eq!(obs.size(), 9);
            assert_eq!(
                sizes(&obs),
                BTreeMap::from([
                    ("bar".to_string(), 3),
                    ("baz".to_string(), 1),
                    ("baz_alias".to_string(), 1),
                    ("foo".to_string(), 4),
                ])
            );
        }
    }

    #[test]
    fn test_purposive_when_max_is_below_subset_count() {
        let f = frame(
            &[("a", 3), ("b", 3), ("c", 3)],
            SampleFilter {
                max: Some(2),
                ..SampleFilter::for_sample("smp")
            },
        );
        let obs = SampleFunc::PurposiveStratified
            .observe(&f, &mut StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(obs.size(), 2);
        assert!(sizes(&obs).values().all(|n| *n == 1));
    }

    #[test]
    fn test_purposive_stratified_returns_all() {
        let f = frame(&[("a", 2), ("b", 1)], SampleFilter::for_sample("smp"));
        let obs = SampleFunc::PurposiveStratified
            .observe(&f, &mut StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(obs.size(), 3);
    }

    #[test]
    fn test_all_requires_full_coverage() {
        let f = frame(
            &[("a", 2)],
            SampleFilter {
                min: 0,
                max: Some(1),
                ..SampleFilter::for_sample("smp")
            },
        );
        let err = SampleFunc::All
            .observe(&f, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(err.to_string().contains("filter is incompatible with returning all"));

        let f = frame(&[("a", 2)], SampleFilter::for_sample("smp"));
        let obs = SampleFunc::All.observe(&f, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(obs.size(), 2);
    }

    #[test]
    fn test_parse_func() {
        assert_eq!("all".parse::<SampleFunc>().unwrap(), SampleFunc::All);
        assert_eq!(
            "purposive_stratified".parse::<SampleFunc>().unwrap(),
            SampleFunc::PurposiveStratified
        );
        assert!("random".parse::<SampleFunc>().is_err());
        assert_eq!(SampleFunc::default().to_string(), "purposive_stratified");
    }
}
