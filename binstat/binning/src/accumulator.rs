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

//! [`BatchAccumulator`]: streaming accumulation into a fixed number of
//! batches.

use binstat_common::config::BinningOptions;
use binstat_common::{config_err, exec_err, invalid_state_err, Element, Result};
use log::{debug, trace};

use crate::cursor::BatchCursor;
use crate::result::BatchResult;
use crate::storage::BatchStorage;

/// Accumulates a stream of observations into `num_batches` batches whose
/// size doubles whenever the buffer fills up.
///
/// Samples are routed to the batch named by a [`BatchCursor`]. A batch is
/// closed once it holds [`current_batch_size`](Self::current_batch_size)
/// samples; when the buffer is full, closing a batch merges two
/// chronologically adjacent batches instead of allocating a new one.
/// Memory usage is therefore `num_batches * size` elements no matter how
/// long the stream is.
///
/// ```
/// use binstat_binning::BatchAccumulator;
///
/// let mut acc = BatchAccumulator::<f64>::try_new(1, 2, 1)?;
/// for x in [1.0, 3.0, 5.0, 7.0] {
///     acc.push(x)?;
/// }
/// let result = acc.finalize()?;
/// assert_eq!(result.count()?, 4);
/// assert_eq!(result.mean()?, vec![4.0]);
/// # Ok::<(), binstat_common::BinstatError>(())
/// ```
///
/// [`finalize`](Self::finalize) moves the storage into a [`BatchResult`].
/// Afterwards the accumulator is invalid until [`reset`](Self::reset) is
/// called.
#[derive(Debug, Clone)]
pub struct BatchAccumulator<T: Element> {
    size: usize,
    num_batches: usize,
    base_size: u64,
    storage: Option<BatchStorage<T>>,
    cursor: BatchCursor,
    // index of the earliest raw sample folded into each batch
    offset: Vec<u64>,
}

impl<T: Element> BatchAccumulator<T> {
    /// Creates an accumulator for observations of `size` elements.
    ///
    /// `num_batches` must be even and non-zero, `base_size` (the number of
    /// samples per batch during the first generation) and `size` must be
    /// non-zero.
    pub fn try_new(size: usize, num_batches: usize, base_size: u64) -> Result<Self> {
        if num_batches == 0 || num_batches % 2 != 0 {
            return config_err!(
                "Number of batches must be even and non-zero, got {num_batches}"
            );
        }
        if base_size == 0 {
            return config_err!("Base batch size must be non-zero");
        }
        if size == 0 {
            return config_err!("Observations must have at least one element");
        }

        Ok(Self {
            size,
            num_batches,
            base_size,
            storage: Some(BatchStorage::new(size, num_batches)),
            cursor: BatchCursor::new(num_batches),
            offset: initial_offsets(num_batches, base_size),
        })
    }

    /// Creates an accumulator with the batch layout taken from `options`
    pub fn try_from_options(size: usize, options: &BinningOptions) -> Result<Self> {
        Self::try_new(size, options.num_batches, options.base_size)
    }

    /// Adds `value`, the elementwise sum of `count` samples.
    ///
    /// Fails with [`InvalidState`](binstat_common::BinstatError::InvalidState)
    /// once the accumulator has been finalized.
    pub fn add(&mut self, value: &[T], count: u64) -> Result<()> {
        let batch_size = self.current_batch_size();
        let Some(storage) = self.storage.as_mut() else {
            return invalid_state_err!("Cannot add to a finalized batch accumulator");
        };
        if value.len() != self.size {
            return exec_err!(
                "Batch accumulator of size {} cannot take a value of size {}",
                self.size,
                value.len()
            );
        }

        if storage.counts()[self.cursor.current()] >= batch_size {
            next_batch(&mut self.cursor, storage, &mut self.offset);
        }

        let current = self.cursor.current();
        for (sum, v) in storage.batch_mut(current).iter_mut().zip(value) {
            *sum += *v;
        }
        storage.counts_mut()[current] += count;
        Ok(())
    }

    /// Adds a single scalar sample; the accumulator must have size 1
    pub fn push(&mut self, value: T) -> Result<()> {
        self.add(&[value], 1)
    }

    /// Adds every scalar sample of `values`, stopping at the first error
    pub fn extend<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        values.into_iter().try_for_each(|v| self.push(v))
    }

    /// Clears all batches and returns to generation 0. A finalized
    /// accumulator gets fresh storage and becomes valid again.
    pub fn reset(&mut self) {
        self.cursor.reset();
        match self.storage.as_mut() {
            Some(storage) => storage.reset(),
            None => self.storage = Some(BatchStorage::new(self.size, self.num_batches)),
        }
        self.offset = initial_offsets(self.num_batches, self.base_size);
    }

    /// Returns a deep copy of the current state as a [`BatchResult`],
    /// leaving the accumulator untouched
    pub fn result(&self) -> Result<BatchResult<T>> {
        Ok(BatchResult::from_storage(self.storage()?.clone()))
    }

    /// Moves the storage into a new [`BatchResult`], leaving the
    /// accumulator invalid
    pub fn finalize(&mut self) -> Result<BatchResult<T>> {
        let storage = self.take_storage()?;
        Ok(BatchResult::from_storage(storage))
    }

    /// Like [`finalize`](Self::finalize), but moves the storage into an
    /// existing `result`, replacing whatever it held
    pub fn finalize_to(&mut self, result: &mut BatchResult<T>) -> Result<()> {
        let storage = self.take_storage()?;
        *result = BatchResult::from_storage(storage);
        Ok(())
    }

    fn take_storage(&mut self) -> Result<BatchStorage<T>> {
        match self.storage.take() {
            Some(storage) => {
                debug!(
                    "Finalizing batch accumulator: {} samples in {} batches of size {} (generation {})",
                    storage.total_count(),
                    self.num_batches,
                    self.current_batch_size(),
                    self.cursor.generation()
                );
                Ok(storage)
            }
            None => invalid_state_err!("Batch accumulator has already been finalized"),
        }
    }

    /// Number of elements per observation
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    pub fn base_size(&self) -> u64 {
        self.base_size
    }

    /// False once the storage has been moved out by a finalize
    pub fn is_valid(&self) -> bool {
        self.storage.is_some()
    }

    /// The underlying storage
    pub fn storage(&self) -> Result<&BatchStorage<T>> {
        match self.storage.as_ref() {
            Some(storage) => Ok(storage),
            None => invalid_state_err!("Batch accumulator has already been finalized"),
        }
    }

    /// Total number of samples added since the last reset
    pub fn count(&self) -> Result<u64> {
        Ok(self.storage()?.total_count())
    }

    /// Number of samples after which the current batch is closed,
    /// `base_size * 2^generation`, saturating at `u64::MAX`
    pub fn current_batch_size(&self) -> u64 {
        self.base_size.saturating_mul(self.cursor.factor())
    }

    /// Number of batch size doublings since the last reset
    pub fn generation(&self) -> u32 {
        self.cursor.generation()
    }

    /// Index of the earliest raw sample folded into each batch
    pub fn offset(&self) -> &[u64] {
        &self.offset
    }
}

fn initial_offsets(num_batches: usize, base_size: u64) -> Vec<u64> {
    (0..num_batches as u64)
        .map(|i| i.saturating_mul(base_size))
        .collect()
}

/// Closes the current batch. In merge mode the batch the cursor moved to is
/// folded into its older neighbour and refilled from scratch.
fn next_batch<T: Element>(
    cursor: &mut BatchCursor,
    storage: &mut BatchStorage<T>,
    offset: &mut [u64],
) {
    cursor.advance();
    if !cursor.merge_mode() {
        return;
    }

    let (into, from) = (cursor.merge_into(), cursor.current());
    storage.fold(into, from);
    offset[into] = offset[into].min(offset[from]);
    offset[from] = storage.total_count();
    trace!(
        "Merged batch {from} into batch {into}, {} samples in batch {into}",
        storage.counts()[into]
    );
}
