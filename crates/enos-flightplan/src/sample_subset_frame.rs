// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Framed sample subsets.

use rand::Rng;

use crate::error::{Error, Result};
use crate::matrix::Matrix;
use crate::sample_subset::SampleSubset;
use crate::scenario_filter::ScenarioFilter;

/// A subset resolved against the scenario it selects.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSubsetFrame {
    /// The subset the frame was built from.
    pub subset: SampleSubset,
    /// Filter used to select the subset's scenario instances.
    pub scenario_filter: ScenarioFilter,
    /// The matching variants. `None` when the scenario has no matrix.
    pub matrix: Option<Matrix>,
}

/// An observation of a single subset frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSubsetObservation {
    /// The observed frame.
    pub frame: SampleSubsetFrame,
    /// Selected variants. `None` when the scenario has no matrix.
    pub matrix: Option<Matrix>,
}

impl SampleSubsetObservation {
    /// Number of observed elements.
    pub fn size(&self) -> usize {
        match &self.matrix {
            Some(m) => m.len(),
            None => self.frame.size(),
        }
    }
}

impl SampleSubsetFrame {
    /// Number of elements in the frame.
    ///
    /// A scenario without variants counts as one element, unless the subset
    /// asked for variants that the scenario does not have.
    pub fn size(&self) -> usize {
        if let Some(matrix) = &self.matrix {
            return matrix.len();
        }

        if self.subset.matrix.as_ref().is_some_and(|m| !m.is_empty()) {
            return 0;
        }

        1
    }

    /// Fails when nothing can be sampled from the frame.
    pub fn validate(&self) -> Result<()> {
        if self.size() > 0 {
            return Ok(());
        }

        let mut msg = format!(
            "the sampling frame for {}/{} is invalid",
            self.subset.sample_name, self.subset.name
        );
        if let Some(matrix) = self.subset.matrix.as_ref().filter(|m| !m.is_empty()) {
            msg = format!(
                "{}: perhaps the matrix variants specified in the subset matrix exclude all possible combinations:\n{}",
                msg, matrix
            );
        }

        Err(Error::Sampling(msg))
    }

    /// Takes a simple random sample of `take` elements without replacement.
    pub fn observe_simple_random<R: Rng + ?Sized>(&self, take: usize, rng: &mut R) -> Result<SampleSubsetObservation> {
        let size = self.size();
        if take > size {
            return Err(Error::Sampling(format!(
                "cannot take a sample of {} from subset frame of {}",
                take, size
            )));
        }

        let Some(matrix) = &self.matrix else {
            return Ok(SampleSubsetObservation {
                frame: self.clone(),
                matrix: None,
            });
        };

        if take == size {
            return Ok(SampleSubsetObservation {
                frame: self.clone(),
                matrix: Some(matrix.clone()),
            });
        }

        let mut observed = Matrix::new();
        for idx in rand::seq::index::sample(rng, size, take) {
            observed.add_vector(matrix.vectors()[idx].clone());
        }

        Ok(SampleSubsetObservation {
            frame: self.clone(),
            matrix: Some(observed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Vector;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn frame(matrix: Option<Matrix>, subset_matrix: Option<Matrix>) -> SampleSubsetFrame {
        SampleSubsetFrame {
            subset: SampleSubset {
                name: "sub".into(),
                sample_name: "smp".into(),
                matrix: subset_matrix,
                ..SampleSubset::default()
            },
            scenario_filter: ScenarioFilter::with_name("sub"),
            matrix,
        }
    }

    fn arch_matrix(n: usize) -> Matrix {
        Matrix::from_vectors((0..n).map(|i| Vector::from_pairs([("arch", format!("a{}", i))])))
    }

    #[test]
    fn test_size() {
        assert_eq!(frame(Some(arch_matrix(3)), None).size(), 3);
        assert_eq!(frame(None, None).size(), 1);
        assert_eq!(frame(None, Some(arch_matrix(1))).size(), 0);
        assert_eq!(frame(Some(Matrix::new()), None).size(), 0);
    }

    #[test]
    fn test_validate() {
        assert!(frame(Some(arch_matrix(1)), None).validate().is_ok());

        let err = frame(Some(Matrix::new()), Some(arch_matrix(2))).validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("the sampling frame for smp/sub is invalid"), "{}", msg);
        assert!(msg.contains("perhaps the matrix variants"), "{}", msg);
    }

    #[test]
    fn test_observe_simple_random() {
        let f = frame(Some(arch_matrix(5)), None);
        let mut rng = StdRng::seed_from_u64(1234);

        let obs = f.observe_simple_random(3, &mut rng).unwrap();
        assert_eq!(obs.size(), 3);
        let m = obs.matrix.unwrap();
        assert_eq!(m.unique().len(), 3);
        for v in m.vectors() {
            assert!(f.matrix.as_ref().unwrap().has_vector(v));
        }

        assert_eq!(f.observe_simple_random(5, &mut rng).unwrap().size(), 5);
        assert!(f.observe_simple_random(6, &mut rng).is_err());
    }

    #[test]
    fn test_observe_is_deterministic() {
        let f = frame(Some(arch_matrix(10)), None);
        let a = f.observe_simple_random(4, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = f.observe_simple_random(4, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }
}
