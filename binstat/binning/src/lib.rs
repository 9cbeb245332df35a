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

//! Bounded-memory binning analysis for correlated Monte Carlo output
//!
//! This crate contains the streaming [`BatchAccumulator`], which groups
//! samples into a fixed number of batches and doubles the batch size by
//! merging batch pairs whenever the buffer fills up, and the
//! [`BatchResult`] derived from it. Means, variances, covariances and
//! standard errors are computed from the batch means with the weighted
//! [`VarianceAccumulator`] and [`CovarianceAccumulator`] kernels.
//!
//! Results of several workers are combined with
//! [`BatchResult::reduce`] through a [`Reducer`](binstat_common::Reducer)
//! and written out through a [`Serializer`](binstat_common::Serializer).

#![cfg_attr(docsrs, feature(doc_cfg))]
// Make sure fast / cheap clones on Arc are explicit
#![deny(clippy::clone_on_ref_ptr)]

pub mod accumulator;
pub mod covariance;
pub mod cursor;
pub mod result;
pub mod storage;
pub mod strategy;
pub mod variance;

pub use accumulator::BatchAccumulator;
pub use covariance::{CovarianceAccumulator, CovarianceMatrix, CovarianceResult};
pub use cursor::BatchCursor;
pub use result::BatchResult;
pub use storage::BatchStorage;
pub use strategy::{Circular, ComplexOp, Elliptic, VarianceStrategy};
pub use variance::{VarianceAccumulator, VarianceResult};
