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

//! [`CovarianceAccumulator`]: weighted covariance matrix of already batched
//! data.

use binstat_common::{exec_err, Element, Moment, Result};

use crate::strategy::VarianceStrategy;

/// A square matrix stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix<C> {
    size: usize,
    data: Vec<C>,
}

impl<C: Moment> CovarianceMatrix<C> {
    fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![C::zero(); size * size],
        }
    }

    /// Number of rows, equal to the number of columns
    pub fn size(&self) -> usize {
        self.size
    }

    /// Entry in row `i`, column `j`
    pub fn get(&self, i: usize, j: usize) -> C {
        self.data[i * self.size + j]
    }

    pub fn as_slice(&self) -> &[C] {
        &self.data
    }

    pub fn diagonal(&self) -> Vec<C> {
        (0..self.size).map(|i| self.get(i, i)).collect()
    }
}

/// Online weighted covariance, the matrix counterpart of
/// [`VarianceAccumulator`](crate::VarianceAccumulator).
///
/// Each point is added with the pairwise update
/// `C += w W / (W + w) · (x - μ)(x - μ)ᴴ` where `W` is the weight seen so far.
#[derive(Debug, Clone)]
pub struct CovarianceAccumulator<T: Element, S: VarianceStrategy<T>> {
    mean: Vec<T>,
    m2: CovarianceMatrix<S::Cov>,
    weight: f64,
    weight2: f64,
    strategy: S,
}

impl<T: Element, S: VarianceStrategy<T>> CovarianceAccumulator<T, S> {
    /// Creates a new `CovarianceAccumulator` for observations of `size`
    /// elements
    pub fn new(size: usize, strategy: S) -> Self {
        Self {
            mean: vec![T::zero(); size],
            m2: CovarianceMatrix::zeros(size),
            weight: 0.0,
            weight2: 0.0,
            strategy,
        }
    }

    pub fn size(&self) -> usize {
        self.mean.len()
    }

    /// Adds the point `value` with the given weight. Zero weights are
    /// ignored.
    pub fn add(&mut self, value: &[T], weight: f64) -> Result<()> {
        if value.len() != self.size() {
            return exec_err!(
                "Covariance accumulator of size {} cannot take a value of size {}",
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
        let delta: Vec<T> = value.iter().zip(&self.mean).map(|(x, m)| *x - *m).collect();

        let size = self.size();
        for i in 0..size {
            for j in 0..size {
                self.m2.data[i * size + j] += S::cov_term(delta[i], delta[j]).scale(spread);
            }
        }
        for (mean, d) in self.mean.iter_mut().zip(&delta) {
            *mean += d.scale(gain);
        }
        self.weight = new_weight;
        self.weight2 += weight * weight;
        Ok(())
    }

    /// Computes the bias corrected covariance matrix, `M2 / (W - W2 / W)`
    pub fn finalize(self) -> CovarianceResult<T, S> {
        let denominator = self.weight - self.weight2 / self.weight;
        let cov = CovarianceMatrix {
            size: self.m2.size,
            data: self
                .m2
                .data
                .into_iter()
                .map(|c| c.unscale(denominator))
                .collect(),
        };
        CovarianceResult {
            mean: self.mean,
            cov,
            weight: self.weight,
            weight2: self.weight2,
            strategy: self.strategy,
        }
    }
}

/// Mean and covariance produced by [`CovarianceAccumulator::finalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceResult<T: Element, S: VarianceStrategy<T>> {
    mean: Vec<T>,
    cov: CovarianceMatrix<S::Cov>,
    weight: f64,
    weight2: f64,
    strategy: S,
}

impl<T: Element, S: VarianceStrategy<T>> CovarianceResult<T, S> {
    pub fn mean(&self) -> &[T] {
        &self.mean
    }

    pub fn cov(&self) -> &CovarianceMatrix<S::Cov> {
        &self.cov
    }

    pub fn into_cov(self) -> CovarianceMatrix<S::Cov> {
        self.cov
    }

    /// Effective number of independent points, `W² / Σw²`
    pub fn observations(&self) -> f64 {
        self.weight * self.weight / self.weight2
    }

    pub fn strategy(&self) -> S {
        self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{Circular, ComplexOp, Elliptic};
    use crate::variance::VarianceAccumulator;
    use binstat_common::Complex64;

    #[test]
    fn diagonal_matches_variance() -> Result<()> {
        let points = [[1.0, 2.0], [3.0, 1.0], [-1.0, 0.5], [2.0, 2.5]];
        let weights = [1.0, 2.0, 1.0, 4.0];
        let mut cov = CovarianceAccumulator::new(2, Circular);
        let mut var = VarianceAccumulator::new(2, Circular);
        for (p, w) in points.iter().zip(weights) {
            cov.add(p, w)?;
            var.add(p, w)?;
        }
        let cov = cov.finalize();
        let var = var.finalize();
        for (c, v) in cov.cov().diagonal().iter().zip(var.var()) {
            assert!((c - v).abs() < 1e-12);
        }
        assert_eq!(cov.cov().get(0, 1), cov.cov().get(1, 0));
        assert!((cov.observations() - var.observations()).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn anticorrelated_pair() -> Result<()> {
        let mut acc = CovarianceAccumulator::new(2, Circular);
        acc.add(&[1.0, -1.0], 1.0)?;
        acc.add(&[-1.0, 1.0], 1.0)?;
        let cov = acc.finalize().into_cov();
        assert_eq!(cov.as_slice(), &[2.0, -2.0, -2.0, 2.0]);
        Ok(())
    }

    #[test]
    fn complex_circular_is_hermitian() -> Result<()> {
        let mut acc = CovarianceAccumulator::new(2, Circular);
        acc.add(&[Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0)], 1.0)?;
        acc.add(&[Complex64::new(-1.0, 0.0), Complex64::new(0.0, -1.0)], 1.0)?;
        let cov = acc.finalize().into_cov();
        assert_eq!(cov.get(0, 0), Complex64::new(2.0, 0.0));
        assert_eq!(cov.get(0, 1), Complex64::new(0.0, -2.0));
        assert_eq!(cov.get(1, 0), cov.get(0, 1).conj());
        Ok(())
    }

    #[test]
    fn complex_elliptic_blocks() -> Result<()> {
        let mut acc = CovarianceAccumulator::new(2, Elliptic);
        acc.add(&[Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0)], 1.0)?;
        acc.add(&[Complex64::new(-1.0, 0.0), Complex64::new(0.0, -1.0)], 1.0)?;
        let cov = acc.finalize().into_cov();
        assert_eq!(cov.get(0, 0), ComplexOp::new(2.0, 0.0, 0.0, 0.0));
        assert_eq!(cov.get(0, 1), ComplexOp::new(0.0, 2.0, 0.0, 0.0));
        assert_eq!(cov.get(1, 1), ComplexOp::new(0.0, 0.0, 0.0, 2.0));
        Ok(())
    }
}
