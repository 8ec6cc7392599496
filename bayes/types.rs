use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

#[repr(transparent)]
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients(pub Array1<f64>);

impl Coefficients {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(Array1::zeros(len))
    }

    /// The coefficients as seen by the likelihood: `γ ⊙ β`.
    pub fn gated(&self, mask: &InclusionMask) -> Array1<f64> {
        Array1::from_shape_fn(self.0.len(), |j| if mask.is_included(j) { self.0[j] } else { 0.0 })
    }
}

impl Deref for Coefficients {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Coefficients {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Array1<f64>> for Coefficients {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl From<Coefficients> for Array1<f64> {
    fn from(values: Coefficients) -> Self {
        values.0
    }
}

#[repr(transparent)]
#[derive(Clone, Debug, PartialEq)]
pub struct LinearPredictor(pub Array1<f64>);

impl LinearPredictor {
    /// Computes `X (γ ⊙ β)`.
    pub fn from_design(
        x: ArrayView2<'_, f64>,
        beta: &Coefficients,
        mask: &InclusionMask,
    ) -> Self {
        Self(x.dot(&beta.gated(mask)))
    }
}

impl Deref for LinearPredictor {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for LinearPredictor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Array1<f64>> for LinearPredictor {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl From<LinearPredictor> for Array1<f64> {
    fn from(values: LinearPredictor) -> Self {
        values.0
    }
}

/// Spike-and-slab indicator per coefficient. `true` means the slab is active
/// and the coefficient enters the linear predictor.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionMask(pub Vec<bool>);

impl InclusionMask {
    pub fn all_included(len: usize) -> Self {
        Self(vec![true; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn is_included(&self, index: usize) -> bool {
        self.0[index]
    }

    #[inline]
    pub fn set(&mut self, index: usize, included: bool) {
        self.0[index] = included;
    }

    pub fn count_included(&self) -> usize {
        self.0.iter().filter(|&&flag| flag).count()
    }

    /// Returns the mask as a 0/1 vector.
    pub fn as_indicator(&self) -> Array1<f64> {
        self.0.iter().map(|&flag| if flag { 1.0 } else { 0.0 }).collect()
    }
}
