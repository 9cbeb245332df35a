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

//! Numeric element types that can be accumulated.
//!
//! Accumulators are generic over an [`Element`] so that the hot `add` path
//! is monomorphized per element type: there is no runtime dispatch between
//! real and complex observations.

use std::fmt::Debug;
use std::ops::{AddAssign, Mul, Sub};

use num_complex::Complex64;
use num_traits::Zero;

use crate::reduce::Reducer;
use crate::serialize::Value;
use crate::Result;

/// A value that can be summed, scaled by a real factor and divided by a
/// real weight. Every statistic produced by the leaf kernels is a
/// [`Moment`].
pub trait Moment: Copy + Debug + PartialEq + Send + Sync + 'static + Zero + AddAssign {
    /// Multiplies by a real factor
    fn scale(self, factor: f64) -> Self;

    /// Divides by a real divisor
    fn unscale(self, divisor: f64) -> Self;
}

/// The element type of an observation: `f64` or [`Complex64`]
pub trait Element: Moment + Sub<Output = Self> + Mul<Output = Self> {
    /// Complex conjugate; the identity for real elements
    fn conj(self) -> Self;

    /// Squared modulus `|x|²`
    fn abs_sqr(self) -> f64;

    /// Combines `data` elementwise across all participants of `reducer`
    fn reduce_with(reducer: &dyn Reducer, data: &mut [Self]) -> Result<()>;

    /// Borrows `data` as a serializable [`Value`]
    fn as_value(data: &[Self]) -> Value<'_>;
}

impl Moment for f64 {
    #[inline]
    fn scale(self, factor: f64) -> Self {
        self * factor
    }

    #[inline]
    fn unscale(self, divisor: f64) -> Self {
        self / divisor
    }
}

impl Element for f64 {
    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn abs_sqr(self) -> f64 {
        self * self
    }

    fn reduce_with(reducer: &dyn Reducer, data: &mut [Self]) -> Result<()> {
        reducer.reduce_f64(data)
    }

    fn as_value(data: &[Self]) -> Value<'_> {
        Value::Real(data)
    }
}

impl Moment for Complex64 {
    #[inline]
    fn scale(self, factor: f64) -> Self {
        self * factor
    }

    #[inline]
    fn unscale(self, divisor: f64) -> Self {
        self / divisor
    }
}

impl Element for Complex64 {
    #[inline]
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }

    #[inline]
    fn abs_sqr(self) -> f64 {
        self.norm_sqr()
    }

    fn reduce_with(reducer: &dyn Reducer, data: &mut [Self]) -> Result<()> {
        reducer.reduce_complex(data)
    }

    fn as_value(data: &[Self]) -> Value<'_> {
        Value::Complex(data)
    }
}
