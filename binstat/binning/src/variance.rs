// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! [`VarianceAccumulator`]: weighted variance of already batched data.

use binstat_common::{exec_err, Element, Moment, Result};
use num_traits::Zero;

use crate::strategy::{Circular, VarianceStrategy};

/// An accumulator to compute the weighted mean and variance of vector valued
/// data, elementwise.
///
/// The algorithm used is an online implementation and numerically stable. It
/// is based on this paper:
/// Welford, B. P. (1962). "Note on a method for calculating corrected sums of
/// squares and products". Technometrics. 4 (3): 419–420.
///
/// Weighted points are added as single-point states with the pairwise merge
/// formula from:
/// West, D. H. D. (1979). "Updating mean and variance estimates: an improved
/// method". Communications of the ACM. 22 (9): 532–535.
#[derive(Debug, Clone)]
pub struct VarianceAccumulator<T: Element, S: VarianceStrategy<T>> {
    mean: Vec<T>,
    m2: Vec<S::Var>,
    weight: f64,
    weight2: f64,
    strategy: S,
}

impl<T: Element, S: VarianceStrategy<T>> VarianceAccumulator<T, S> {
    /// Creates a new `VarianceAccumulator` for observations of `size`
    /// elements
    pub fn new(size: usize, strategy: S) -> Self {
        Self {
            mean: vec![T::zero(); size],
            m2: vec![S::Var::zero(); size],
            weight: 0.0,
            weight2: 0.0,
            strategy,
        }
    }

    pub fn size(&self) -> usize {
        self.mean.len()
    }

    /// Sum of weights added so far
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Adds the point `value` with the given weight. Zero weights are
    /// ignored.
    pub fn add(&mut self, value: &[T], weight: f64) -> Result<()> {
        if value.len() != self.size() {
            return exec_err!(
                "Variance accumulator of size {} cannot take a value of size {}",
                self.size(),
                value.len()
            );
        }
        if weight == 0.0 {
            return Ok(());
        }

        let new_weight = self.weight + weight;
        let gain = weight / new_weight;
        let spread = weight * self.weight / new_weight;
        for ((mean, m2), x) in self.mean.iter_mut().zip(&mut self.m2).zip(value) {
            let delta = *x - *mean;
            *mean += delta.scale(gain);
            *m2 += S::var_term(delta).scale(spread);
        }
        self.weight = new_weight;
        self.weight2 += weight * weight;
        Ok(())
    }

    /// Merges the state of another accumulator into this one
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if other.size() != self.size() {
            return exec_err!(
                "Cannot merge variance accumulators of size {} and {}",
                self.size(),
                other.size()
            );
        }
        if other.weight == 0.0 {
            return Ok(());
        }

        let new_weight = self.weight + other.weight;
        let gain = other.weight / new_weight;
        let spread = other.weight * self.weight / new_weight;
        for (((mean, m2), mean2), m22) in self
            .mean
            .iter_mut()
            .zip(&mut self.m2)
            .zip(&other.mean)
            .zip(&other.m2)
        {
            let delta = *mean2 - *mean;
            *mean += delta.scale(gain);
            *m2 += *m22;
            *m2 += S::var_term(delta).scale(spread);
        }
        self.weight = new_weight;
        self.weight2 += other.weight2;
        Ok(())
    }

    /// Computes the bias corrected variance.
    ///
    /// With `W = Σw` and `W2 = Σw²` the estimate is `M2 / (W - W2 / W)`,
    /// which reduces to the usual `n - 1` denominator for equal weights.
    /// Fewer than two points of non-zero weight give NaN.
    pub fn finalize(self) -> VarianceResult<T, S> {
        let denominator = self.weight - self.weight2 / self.weight;
        VarianceResult {
            var: self.m2.into_iter().map(|m| m.unscale(denominator)).collect(),
            mean: self.mean,
            weight: self.weight,
            weight2: self.weight2,
            strategy: self.strategy,
        }
    }
}

/// Mean and variance produced by [`VarianceAccumulator::finalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceResult<T: Element, S: VarianceStrategy<T>> {
    mean: Vec<T>,
    var: Vec<S::Var>,
    weight: f64,
    weight2: f64,
    strategy: S,
}

impl<T: Element, S: VarianceStrategy<T>> VarianceResult<T, S> {
    pub fn mean(&self) -> &[T] {
        &self.mean
    }

    pub fn var(&self) -> &[S::Var] {
        &self.var
    }

    pub fn into_var(self) -> Vec<S::Var> {
        self.var
    }

    /// Effective number of independent points, `W² / Σw²`
    pub fn observations(&self) -> f64 {
        self.weight * self.weight / self.weight2
    }

    pub fn strategy(&self) -> S {
        self.strategy
    }
}

impl<T: Element> VarianceResult<T, Circular> {
    /// Standard error of the mean, `sqrt(var / observations)`
    pub fn stderror(&self) -> Vec<f64> {
        let observations = self.observations();
        self.var
            .iter()
            .map(|v| (v / observations).sqrt())
            .collect()
    }
}
