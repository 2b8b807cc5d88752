//! Class probability vector produced by a model

use serde::{Deserialize, Serialize};

/// Softmax output of one image, indexed by class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.0.iter().copied()
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Index of the largest probability; the first one wins on ties, NaN never wins
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (index, &value) in self.0.iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            match best {
                Some((_, current)) if value <= current => {}
                _ => best = Some((index, value)),
            }
        }
        best.map(|(index, _)| index)
    }

    pub fn max(&self) -> Option<f32> {
        self.argmax().map(|index| self.0[index])
    }

    /// `(index, probability)` pairs sorted by descending probability, stable on ties
    ///
    /// NaN entries are left out, so the first pair always agrees with [`Self::argmax`].
    pub fn ranked(&self) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = self
            .0
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, value)| !value.is_nan())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

impl From<Vec<f32>> for ProbabilityVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}
