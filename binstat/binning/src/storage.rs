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

//! [`BatchStorage`]: the raw buffers behind an accumulator.

use std::mem::size_of;

use binstat_common::Element;

/// Per-batch sums and sample counts.
///
/// Sums live in one flat, column-major buffer: column `i` occupies
/// `batches[i * size..(i + 1) * size]` and holds the elementwise running sum
/// of every observation routed to batch `i`. Each column is contiguous, which
/// is what lets a whole column, or the whole buffer, be handed to a
/// [`Reducer`](binstat_common::Reducer) or a
/// [`Serializer`](binstat_common::Serializer) without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStorage<T: Element> {
    size: usize,
    num_batches: usize,
    batches: Vec<T>,
    counts: Vec<u64>,
}

impl<T: Element> BatchStorage<T> {
    /// Allocates zeroed storage for `num_batches` columns of `size` elements
    pub fn new(size: usize, num_batches: usize) -> Self {
        Self {
            size,
            num_batches,
            batches: vec![T::zero(); size * num_batches],
            counts: vec![0; num_batches],
        }
    }

    /// Zeroes all sums and counts
    pub fn reset(&mut self) {
        self.batches.fill(T::zero());
        self.counts.fill(0);
    }

    /// Number of elements per observation, i.e. the column stride
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Sum of column `i`
    pub fn batch(&self, i: usize) -> &[T] {
        &self.batches[i * self.size..(i + 1) * self.size]
    }

    pub fn batch_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.batches[i * self.size..(i + 1) * self.size]
    }

    /// The whole column-major sum buffer
    pub fn batches(&self) -> &[T] {
        &self.batches
    }

    /// Per-batch sample counts
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn counts_mut(&mut self) -> &mut [u64] {
        &mut self.counts
    }

    /// Both buffers at once, for in-place combination across workers
    pub fn buffers_mut(&mut self) -> (&mut [T], &mut [u64]) {
        (&mut self.batches, &mut self.counts)
    }

    /// Total number of samples over all batches
    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Elementwise sum over all batches
    pub fn total_sum(&self) -> Vec<T> {
        let mut sum = vec![T::zero(); self.size];
        for column in self.batches.chunks_exact(self.size.max(1)) {
            for (s, v) in sum.iter_mut().zip(column) {
                *s += *v;
            }
        }
        sum
    }

    /// Folds batch `from` into batch `into` and clears `from`. Totals are
    /// unchanged.
    pub fn fold(&mut self, into: usize, from: usize) {
        debug_assert_ne!(into, from, "cannot fold a batch into itself");
        self.counts[into] += self.counts[from];
        self.counts[from] = 0;

        for k in 0..self.size {
            let v = self.batches[from * self.size + k];
            self.batches[into * self.size + k] += v;
            self.batches[from * self.size + k] = T::zero();
        }
    }

    /// Allocated size in bytes, including `Self`
    pub fn allocated_size(&self) -> usize {
        size_of::<Self>()
            + self.batches.capacity() * size_of::<T>()
            + self.counts.capacity() * size_of::<u64>()
    }
}
