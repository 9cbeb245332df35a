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

//! Variance conventions for real and complex data.
//!
//! [`Circular`] treats the real and imaginary parts of a complex quantity as
//! statistically symmetric and yields a real variance `E|x - μ|²`.
//! [`Elliptic`] keeps the full 2×2 second moment of `(re, im)`, including the
//! cross term, as a [`ComplexOp`]. For real data both agree, so [`Elliptic`]
//! is only available for [`Complex64`].

use std::fmt::Debug;
use std::ops::{Add, AddAssign};

use binstat_common::{Complex64, Element, Moment};
use num_traits::Zero;

/// Selects how second moments are formed from deviations from the mean.
///
/// The strategy is passed by value to
/// [`BatchResult::var`](crate::BatchResult::var) and friends; its output
/// types are fixed at compile time.
pub trait VarianceStrategy<T: Element>: Copy + Debug + Send + Sync + 'static {
    /// Element type of a variance vector
    type Var: Moment;
    /// Element type of a covariance matrix
    type Cov: Moment;

    /// Second moment of a single deviation `dx`
    fn var_term(dx: T) -> Self::Var;

    /// Mixed second moment of the deviations `dx` and `dy`
    fn cov_term(dx: T, dy: T) -> Self::Cov;
}

/// `var = E|x - μ|²`, `cov = E[(x - μ)(y - μ)*]`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Circular;

impl<T: Element> VarianceStrategy<T> for Circular {
    type Var = f64;
    type Cov = T;

    #[inline]
    fn var_term(dx: T) -> f64 {
        dx.abs_sqr()
    }

    #[inline]
    fn cov_term(dx: T, dy: T) -> T {
        dx * dy.conj()
    }
}

/// Treats a complex number as the pair `(re, im)` and keeps all four
/// second moments
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elliptic;

impl VarianceStrategy<Complex64> for Elliptic {
    type Var = ComplexOp;
    type Cov = ComplexOp;

    #[inline]
    fn var_term(dx: Complex64) -> ComplexOp {
        ComplexOp::outer(dx, dx)
    }

    #[inline]
    fn cov_term(dx: Complex64, dy: Complex64) -> ComplexOp {
        ComplexOp::outer(dx, dy)
    }
}

/// A real 2×2 matrix acting on `(re, im)` pairs.
///
/// `ComplexOp::outer(a, b)` is the outer product of `(a.re, a.im)` with
/// `(b.re, b.im)`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ComplexOp {
    pub rere: f64,
    pub reim: f64,
    pub imre: f64,
    pub imim: f64,
}

impl ComplexOp {
    pub fn new(rere: f64, reim: f64, imre: f64, imim: f64) -> Self {
        Self {
            rere,
            reim,
            imre,
            imim,
        }
    }

    /// Outer product of the `(re, im)` vectors of `a` and `b`
    pub fn outer(a: Complex64, b: Complex64) -> Self {
        Self::new(a.re * b.re, a.re * b.im, a.im * b.re, a.im * b.im)
    }

    /// Sum of the diagonal; equals the circular variance
    pub fn trace(&self) -> f64 {
        self.rere + self.imim
    }
}

impl Add for ComplexOp {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.rere + rhs.rere,
            self.reim + rhs.reim,
            self.imre + rhs.imre,
            self.imim + rhs.imim,
        )
    }
}

impl AddAssign for ComplexOp {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Zero for ComplexOp {
    fn zero() -> Self {
        Self::default()
    }

    fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Moment for ComplexOp {
    fn scale(self, factor: f64) -> Self {
        Self::new(
            self.rere * factor,
            self.reim * factor,
            self.imre * factor,
            self.imim * factor,
        )
    }

    fn unscale(self, divisor: f64) -> Self {
        Self::new(
            self.rere / divisor,
            self.reim / divisor,
            self.imre / divisor,
            self.imim / divisor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_terms() {
        assert_eq!(<Circular as VarianceStrategy<f64>>::var_term(-3.0), 9.0);
        assert_eq!(<Circular as VarianceStrategy<f64>>::cov_term(2.0, -3.0), -6.0);

        let a = Complex64::new(1.0, 2.0);
        let b = Complex64::new(3.0, -1.0);
        assert_eq!(<Circular as VarianceStrategy<Complex64>>::var_term(a), 5.0);
        // a * conj(b) = (1 + 2i)(3 + i)
        assert_eq!(
            <Circular as VarianceStrategy<Complex64>>::cov_term(a, b),
            Complex64::new(1.0, 7.0)
        );
    }

    #[test]
    fn elliptic_terms() {
        let a = Complex64::new(1.0, 2.0);
        let b = Complex64::new(3.0, -1.0);
        assert_eq!(Elliptic::var_term(a), ComplexOp::new(1.0, 2.0, 2.0, 4.0));
        assert_eq!(Elliptic::cov_term(a, b), ComplexOp::new(3.0, -1.0, 6.0, -2.0));
        assert_eq!(
            Elliptic::var_term(a).trace(),
            <Circular as VarianceStrategy<Complex64>>::var_term(a)
        );
    }

    #[test]
    fn complex_op_moment() {
        let m = ComplexOp::new(1.0, 2.0, 3.0, 4.0);
        let mut acc = ComplexOp::zero();
        acc += m;
        acc += m;
        assert_eq!(acc, m.scale(2.0));
        assert_eq!(acc.unscale(2.0), m);
        assert!(ComplexOp::zero().is_zero());
    }
}
