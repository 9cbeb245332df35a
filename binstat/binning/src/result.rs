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

//! [`BatchResult`]: statistics over the batches of a finalized
//! accumulator.

use std::fmt::{self, Display, Formatter};

use binstat_common::{
    invalid_state_err, Element, Reducer, Result, Serializer, Value,
};
use log::debug;

use crate::covariance::{CovarianceAccumulator, CovarianceMatrix};
use crate::storage::BatchStorage;
use crate::strategy::{Circular, VarianceStrategy};
use crate::variance::{VarianceAccumulator, VarianceResult};

/// The batches of a finalized [`BatchAccumulator`](crate::BatchAccumulator).
///
/// Error estimates treat each non-empty batch mean as one observation,
/// weighted by its sample count. Once batches are longer than the
/// autocorrelation time of the stream these observations are close to
/// independent, so [`stderror`](Self::stderror) accounts for correlations
/// that the naive standard error ignores.
///
/// A result whose storage was released by [`reduce`](Self::reduce) is
/// invalid: every operation reading data fails with
/// [`InvalidState`](binstat_common::BinstatError::InvalidState).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<T: Element> {
    storage: Option<BatchStorage<T>>,
}

impl<T: Element> Default for BatchResult<T> {
    /// An invalid result holding no storage
    fn default() -> Self {
        Self { storage: None }
    }
}

impl<T: Element> BatchResult<T> {
    pub(crate) fn from_storage(storage: BatchStorage<T>) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.storage.is_some()
    }

    /// The underlying batches
    pub fn storage(&self) -> Result<&BatchStorage<T>> {
        match self.storage.as_ref() {
            Some(storage) => Ok(storage),
            None => invalid_state_err!("Batch result has no storage"),
        }
    }

    fn storage_mut(&mut self) -> Result<&mut BatchStorage<T>> {
        match self.storage.as_mut() {
            Some(storage) => Ok(storage),
            None => invalid_state_err!("Batch result has no storage"),
        }
    }

    /// Total number of samples
    pub fn count(&self) -> Result<u64> {
        Ok(self.storage()?.total_count())
    }

    /// Number of elements per observation
    pub fn size(&self) -> Result<usize> {
        Ok(self.storage()?.size())
    }

    pub fn num_batches(&self) -> Result<usize> {
        Ok(self.storage()?.num_batches())
    }

    /// Elementwise mean over all samples. NaN if no sample was added.
    pub fn mean(&self) -> Result<Vec<T>> {
        let storage = self.storage()?;
        let count = storage.total_count() as f64;
        Ok(storage
            .total_sum()
            .into_iter()
            .map(|s| s.unscale(count))
            .collect())
    }

    fn batch_variance<S: VarianceStrategy<T>>(
        &self,
        strategy: S,
    ) -> Result<VarianceResult<T, S>> {
        let storage = self.storage()?;
        let mut acc = VarianceAccumulator::new(storage.size(), strategy);
        let mut mean = vec![T::zero(); storage.size()];
        for_each_batch_mean(storage, &mut mean, |mean, weight| acc.add(mean, weight))?;
        Ok(acc.finalize())
    }

    /// Variance of the batch means, elementwise.
    ///
    /// `strategy` selects the convention for complex data, see
    /// [`Circular`] and [`Elliptic`](crate::Elliptic).
    pub fn var<S: VarianceStrategy<T>>(&self, strategy: S) -> Result<Vec<S::Var>> {
        Ok(self.batch_variance(strategy)?.into_var())
    }

    /// Covariance matrix of the batch means
    pub fn cov<S: VarianceStrategy<T>>(
        &self,
        strategy: S,
    ) -> Result<CovarianceMatrix<S::Cov>> {
        let storage = self.storage()?;
        let mut acc = CovarianceAccumulator::new(storage.size(), strategy);
        let mut mean = vec![T::zero(); storage.size()];
        for_each_batch_mean(storage, &mut mean, |mean, weight| acc.add(mean, weight))?;
        Ok(acc.finalize().into_cov())
    }

    /// Standard error of the mean, elementwise
    pub fn stderror(&self) -> Result<Vec<f64>> {
        Ok(self.batch_variance(Circular)?.stderror())
    }

    /// Effective number of independent batches, `(Σ nᵢ)² / Σ nᵢ²` over the
    /// batch counts `nᵢ`
    pub fn observations(&self) -> Result<f64> {
        Ok(self.batch_variance(Circular)?.observations())
    }

    /// Combines this result with the results of all other participants of
    /// `reducer`'s group.
    ///
    /// This is a collective operation: every participant must call it with
    /// the same flags.
    ///
    /// * `pre_commit` sums the batch sums and counts across the group, in
    ///   place.
    /// * `post_commit` releases the storage of every participant that does
    ///   not report [`have_result`](binstat_common::ReducerSetup::have_result).
    ///
    /// With both flags set the round is committed exactly once. When the
    /// phases are called separately, committing in between is up to the
    /// caller.
    ///
    /// Batch `i` of the combined result is the union of batch `i` of every
    /// participant. The mean and total count are exact, but batches of
    /// different workers mix, so error estimates are only meaningful when
    /// every participant processed a stream of the same length.
    pub fn reduce(
        &mut self,
        reducer: &dyn Reducer,
        pre_commit: bool,
        post_commit: bool,
    ) -> Result<()> {
        let storage = self.storage_mut()?;

        if pre_commit {
            let (batches, counts) = storage.buffers_mut();
            T::reduce_with(reducer, batches)?;
            reducer.reduce_count(counts)?;
        }
        if pre_commit && post_commit {
            reducer.commit()?;
        }
        if post_commit {
            let setup = reducer.setup();
            if !setup.have_result {
                debug!(
                    "Releasing batch storage of participant {}/{} after reduction",
                    setup.pos, setup.count
                );
                self.storage = None;
            }
        }
        Ok(())
    }

    /// Writes the result into `sink`:
    ///
    /// ```text
    /// count        total number of samples
    /// mean/value   mean
    /// mean/error   standard error of the mean
    /// batch/count  sample count of every batch
    /// batch/sum    batch sums, column-major
    /// ```
    pub fn serialize(&self, sink: &mut dyn Serializer) -> Result<()> {
        let storage = self.storage()?;
        let mean = self.mean()?;
        let error = self.stderror()?;

        sink.write("count", Value::Count(storage.total_count()))?;
        sink.write("mean/value", T::as_value(&mean))?;
        sink.write("mean/error", Value::Real(&error))?;
        sink.write("batch/count", Value::Counts(storage.counts()))?;
        sink.write("batch/sum", T::as_value(storage.batches()))?;
        Ok(())
    }
}

/// Calls `f` with the mean and count of every non-empty batch
fn for_each_batch_mean<T, F>(
    storage: &BatchStorage<T>,
    mean: &mut [T],
    mut f: F,
) -> Result<()>
where
    T: Element,
    F: FnMut(&[T], f64) -> Result<()>,
{
    for (i, count) in storage.counts().iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let weight = *count as f64;
        for (m, s) in mean.iter_mut().zip(storage.batch(i)) {
            *m = s.unscale(weight);
        }
        f(mean, weight)?;
    }
    Ok(())
}

impl<T: Element + Display> Display for BatchResult<T> {
    /// Formats the result as `mean ± error` per element
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (Ok(mean), Ok(error)) = (self.mean(), self.stderror()) else {
            return write!(f, "<invalid>");
        };
        for (i, (m, e)) in mean.iter().zip(&error).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{m} ± {e}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::BatchAccumulator;
    use crate::strategy::{ComplexOp, Elliptic};
    use binstat_common::{
        BinstatError, Complex64, LocalReducer, MemorySerializer, NoopReducer, OwnedValue,
    };
    use std::thread;

    fn result_of(values: &[f64], num_batches: usize) -> Result<BatchResult<f64>> {
        let mut acc = BatchAccumulator::try_new(1, num_batches, 1)?;
        acc.extend(values.iter().copied())?;
        acc.finalize()
    }

    #[test]
    fn statistics_of_batch_means() -> Result<()> {
        // four batches holding 1, 3, 5 and 7
        let result = result_of(&[1.0, 3.0, 5.0, 7.0], 4)?;
        assert_eq!(result.count()?, 4);
        assert_eq!(result.mean()?, vec![4.0]);
        // sum of squared deviations is 20
        let var = result.var(Circular)?;
        assert!((var[0] - 20.0 / 3.0).abs() < 1e-12);
        assert_eq!(result.observations()?, 4.0);
        let error = result.stderror()?;
        assert!((error[0] - (20.0 / 3.0 / 4.0_f64).sqrt()).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn empty_batches_are_skipped() -> Result<()> {
        // only two of the eight batches are used
        let sparse = result_of(&[1.0, 3.0], 8)?;
        let dense = result_of(&[1.0, 3.0], 2)?;
        assert_eq!(sparse.var(Circular)?, dense.var(Circular)?);
        assert_eq!(sparse.var(Circular)?, vec![2.0]);
        assert_eq!(sparse.observations()?, 2.0);
        Ok(())
    }

    #[test]
    fn empty_result_is_nan() -> Result<()> {
        let result = result_of(&[], 2)?;
        assert_eq!(result.count()?, 0);
        assert!(result.mean()?[0].is_nan());
        assert!(result.var(Circular)?[0].is_nan());
        assert!(result.stderror()?[0].is_nan());
        Ok(())
    }

    #[test]
    fn covariance_of_batch_means() -> Result<()> {
        let mut acc = BatchAccumulator::try_new(2, 2, 1)?;
        acc.add(&[1.0, -1.0], 1)?;
        acc.add(&[-1.0, 1.0], 1)?;
        let result = acc.finalize()?;

        let cov = result.cov(Circular)?;
        assert_eq!(cov.size(), 2);
        assert_eq!(cov.as_slice(), &[2.0, -2.0, -2.0, 2.0]);
        assert_eq!(cov.diagonal(), result.var(Circular)?);
        Ok(())
    }

    #[test]
    fn complex_strategies() -> Result<()> {
        let mut acc = BatchAccumulator::try_new(1, 2, 1)?;
        acc.push(Complex64::new(1.0, 1.0))?;
        acc.push(Complex64::new(-1.0, -1.0))?;
        let result = acc.finalize()?;

        assert_eq!(result.var(Circular)?, vec![4.0]);
        assert_eq!(result.var(Elliptic)?, vec![ComplexOp::new(2.0, 2.0, 2.0, 2.0)]);
        assert_eq!(
            result.cov(Elliptic)?.get(0, 0),
            ComplexOp::new(2.0, 2.0, 2.0, 2.0)
        );
        assert_eq!(result.stderror()?, vec![2.0_f64.sqrt()]);
        Ok(())
    }

    #[test]
    fn invalid_result_fails() {
        let result = BatchResult::<f64>::default();
        assert!(!result.is_valid());
        assert!(matches!(result.count(), Err(BinstatError::InvalidState(_))));
        assert!(result.mean().is_err());
        assert!(result.var(Circular).is_err());
        assert!(result.cov(Circular).is_err());
        assert!(result.stderror().is_err());
        assert!(result.serialize(&mut MemorySerializer::new()).is_err());
        assert_eq!(result.to_string(), "<invalid>");

        let mut result = result;
        assert!(result.reduce(&NoopReducer, true, true).is_err());
    }

    #[test]
    fn identity_reduction_keeps_statistics() -> Result<()> {
        let mut result = result_of(&[1.0, 2.0, 4.0, 8.0, 16.0], 4)?;
        let before = result.clone();
        result.reduce(&NoopReducer, true, true)?;
        assert!(result.is_valid());
        assert_eq!(result, before);
        assert_eq!(result.var(Circular)?, before.var(Circular)?);
        Ok(())
    }

    #[test]
    fn split_phases_leave_commit_to_caller() -> Result<()> {
        let group = LocalReducer::group(1);
        let reducer = &group[0];
        let mut result = result_of(&[1.0, 2.0], 2)?;

        result.reduce(reducer, true, false)?;
        assert_eq!(reducer.commits(), 0);
        reducer.commit()?;
        result.reduce(reducer, false, true)?;
        assert_eq!(reducer.commits(), 1);
        assert_eq!(result.count()?, 2);

        result.reduce(reducer, true, true)?;
        assert_eq!(reducer.commits(), 2);
        Ok(())
    }

    #[test]
    fn workers_reduce_to_root() {
        let group = LocalReducer::group(3);
        let results: Vec<Result<BatchResult<f64>>> = thread::scope(|s| {
            let handles: Vec<_> = group
                .iter()
                .map(|reducer| {
                    s.spawn(move || {
                        let pos = reducer.setup().pos as f64;
                        let values: Vec<f64> =
                            (0..4).map(|i| pos * 4.0 + f64::from(i)).collect();
                        let mut result = result_of(&values, 4)?;
                        result.reduce(reducer, true, true)?;
                        Ok::<_, BinstatError>(result)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let results: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        let root = &results[0];
        assert_eq!(root.count().unwrap(), 12);
        // values 0..12
        assert_eq!(root.mean().unwrap(), vec![5.5]);
        assert_eq!(root.storage().unwrap().counts(), &[3, 3, 3, 3]);
        assert!(!results[1].is_valid());
        assert!(!results[2].is_valid());
        assert!(group.iter().all(|r| r.commits() == 1));
    }

    #[test]
    fn serialize_layout() -> Result<()> {
        let result = result_of(&[1.0, 3.0, 5.0, 7.0], 2)?;
        let mut sink = MemorySerializer::new();
        result.serialize(&mut sink)?;

        assert_eq!(
            sink.keys().collect::<Vec<_>>(),
            vec!["batch/count", "batch/sum", "count", "mean/error", "mean/value"]
        );
        assert_eq!(sink.get("count"), Some(&OwnedValue::Count(4)));
        assert_eq!(sink.get("mean/value"), Some(&OwnedValue::Real(vec![4.0])));
        assert_eq!(sink.get("mean/error"), Some(&OwnedValue::Real(vec![2.0])));
        assert_eq!(sink.get("batch/count"), Some(&OwnedValue::Counts(vec![2, 2])));
        assert_eq!(sink.get("batch/sum"), Some(&OwnedValue::Real(vec![4.0, 12.0])));
        Ok(())
    }

    #[test]
    fn serialize_complex() -> Result<()> {
        let mut acc = BatchAccumulator::try_new(1, 2, 1)?;
        acc.push(Complex64::new(0.0, 2.0))?;
        let mut sink = MemorySerializer::new();
        acc.finalize()?.serialize(&mut sink)?;
        assert_eq!(
            sink.get("batch/sum"),
            Some(&OwnedValue::Complex(vec![
                Complex64::new(0.0, 2.0),
                Complex64::new(0.0, 0.0)
            ]))
        );
        Ok(())
    }

    #[test]
    fn display_mean_and_error() -> Result<()> {
        let result = result_of(&[1.0, 3.0, 5.0, 7.0], 2)?;
        assert_eq!(result.to_string(), "4 ± 2");
        Ok(())
    }
}
