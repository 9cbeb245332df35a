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

//! [`BatchCursor`]: decides which batch receives samples and when to merge.
//!
//! During generation 0 the cursor walks the batches `0, 1, ..., n - 1`
//! once. When it would wrap, the buffer is full: the cursor enters merge mode
//! and starts generation 1, doubling the batch size. From then on every
//! advance pairs two chronologically adjacent batches. The older one
//! (`merge_into`) absorbs the younger one (`current`), which is cleared and
//! becomes the batch receiving new samples. After `n / 2` advances every
//! batch again holds the same number of samples and the next generation
//! starts.
//!
//! Example for `n = 4`, where letters name the chronological blocks:
//!
//! ```text
//! generation 0:  [a  b  c  d ]
//! generation 1:  [ab e  cd f ]   pairs (0, 1), (2, 3)
//! generation 2:  [abcd ef g h]   pairs (0, 2), (1, 3)
//! ```
//!
//! Storage never grows and the batch size doubles once per generation, so
//! after `N` samples the batch size is `O(N / n)` with `O(log N)` merges
//! per batch.

use log::debug;

/// Maps a stream of advance events onto batch indices and merge decisions.
///
/// The sequence of `(current, merge_into, merge_mode)` states only depends
/// on the number of calls to [`advance`](Self::advance) and on
/// `num_batches`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCursor {
    num_batches: usize,
    current: usize,
    merge_into: usize,
    merge_mode: bool,
    generation: u32,
    // pair index within the current generation
    pair: usize,
    // batch indices ordered from oldest to youngest data
    order: Vec<usize>,
}

impl BatchCursor {
    /// Creates a cursor over `num_batches` batches, which must be even and
    /// non-zero. Validation is left to the accumulator.
    pub fn new(num_batches: usize) -> Self {
        debug_assert!(num_batches > 0 && num_batches % 2 == 0);
        Self {
            num_batches,
            current: 0,
            merge_into: 0,
            merge_mode: false,
            generation: 0,
            pair: 0,
            order: (0..num_batches).collect(),
        }
    }

    /// Returns to generation 0, batch 0
    pub fn reset(&mut self) {
        self.current = 0;
        self.merge_into = 0;
        self.merge_mode = false;
        self.generation = 0;
        self.pair = 0;
        self.order.clear();
        self.order.extend(0..self.num_batches);
    }

    /// Moves to the next batch.
    ///
    /// After this returns, [`merge_mode`](Self::merge_mode) tells whether
    /// batch [`current`](Self::current) has to be folded into
    /// [`merge_into`](Self::merge_into) before it receives new samples.
    pub fn advance(&mut self) {
        if !self.merge_mode {
            if self.current + 1 < self.num_batches {
                self.current += 1;
                return;
            }
            // buffer is full
            self.merge_mode = true;
            self.start_generation();
        } else {
            self.pair += 1;
            if self.pair == self.num_batches / 2 {
                // survivors of this generation are older than the refilled
                // batches, in pair order
                let (older, younger): (Vec<usize>, Vec<usize>) =
                    self.order.chunks_exact(2).map(|p| (p[0], p[1])).unzip();
                self.order.clear();
                self.order.extend(older);
                self.order.extend(younger);
                self.start_generation();
            }
        }
        self.merge_into = self.order[2 * self.pair];
        self.current = self.order[2 * self.pair + 1];
    }

    fn start_generation(&mut self) {
        self.generation += 1;
        self.pair = 0;
        debug!(
            "Rebatching {} batches: starting generation {}",
            self.num_batches, self.generation
        );
    }

    /// Batch receiving new samples
    pub fn current(&self) -> usize {
        self.current
    }

    /// Batch that absorbs [`current`](Self::current) when in merge mode
    pub fn merge_into(&self) -> usize {
        self.merge_into
    }

    /// True once the buffer has been filled for the first time; from then
    /// on every advance merges a pair of batches
    pub fn merge_mode(&self) -> bool {
        self.merge_mode
    }

    /// Number of rebatching cycles started since the last reset
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Batch size multiplier, `2^generation`, saturating at `u64::MAX`
    pub fn factor(&self) -> u64 {
        1_u64.checked_shl(self.generation).unwrap_or(u64::MAX)
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(num_batches: usize, steps: usize) -> Vec<(usize, usize, bool, u32)> {
        let mut cursor = BatchCursor::new(num_batches);
        (0..steps)
            .map(|_| {
                cursor.advance();
                (
                    cursor.current(),
                    cursor.merge_into(),
                    cursor.merge_mode(),
                    cursor.generation(),
                )
            })
            .collect()
    }

    #[test]
    fn fills_then_merges_adjacent_pairs() {
        let expected = vec![
            (1, 0, false, 0),
            (2, 0, false, 0),
            (3, 0, false, 0),
            // generation 1: (0, 1), (2, 3)
            (1, 0, true, 1),
            (3, 2, true, 1),
            // generation 2: chronological order is 0, 2, 1, 3
            (2, 0, true, 2),
            (3, 1, true, 2),
            // generation 3: chronological order is back to 0, 1, 2, 3
            (1, 0, true, 3),
            (3, 2, true, 3),
        ];
        assert_eq!(states(4, 9), expected);
    }

    #[test]
    fn two_batches_always_merge_into_first() {
        let states = states(2, 5);
        assert_eq!(states[0], (1, 0, false, 0));
        assert!(states[1..].iter().all(|s| s.0 == 1 && s.1 == 0 && s.2));
        assert_eq!(
            states.iter().map(|s| s.3).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn factor_doubles_per_generation() {
        let mut cursor = BatchCursor::new(6);
        let mut factors = vec![cursor.factor()];
        for _ in 0..(5 + 3 * 3) {
            cursor.advance();
            factors.push(cursor.factor());
        }
        assert!(factors.windows(2).all(|w| w[1] == w[0] || w[1] == 2 * w[0]));
        assert_eq!(cursor.factor(), 8);
    }

    #[test]
    fn factor_saturates() {
        // with two batches every merge starts a new generation
        let mut cursor = BatchCursor::new(2);
        for _ in 0..64 {
            cursor.advance();
        }
        assert_eq!(cursor.generation(), 63);
        assert_eq!(cursor.factor(), 1 << 63);

        for _ in 0..5 {
            cursor.advance();
        }
        assert_eq!(cursor.generation(), 68);
        assert_eq!(cursor.factor(), u64::MAX);
    }

    #[test]
    fn every_generation_visits_each_batch_once() {
        let n = 8;
        let mut cursor = BatchCursor::new(n);
        for _ in 0..(n - 1) {
            cursor.advance();
        }
        for generation in 1..5 {
            let mut touched = vec![];
            for _ in 0..n / 2 {
                cursor.advance();
                assert_eq!(cursor.generation(), generation);
                touched.push(cursor.current());
                touched.push(cursor.merge_into());
            }
            touched.sort_unstable();
            assert_eq!(touched, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn deterministic_and_resettable() {
        let mut a = BatchCursor::new(4);
        let mut b = BatchCursor::new(4);
        for _ in 0..11 {
            a.advance();
            b.advance();
            assert_eq!(a, b);
        }
        a.reset();
        assert_eq!(a, BatchCursor::new(4));
    }
}
