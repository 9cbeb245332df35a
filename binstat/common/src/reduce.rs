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

//! [`Reducer`]: combines partial results across workers.
//!
//! A reduction is a collective operation: every participant of a group
//! calls the same sequence of `reduce_*` methods, with buffers of the same
//! length, in the same logical round. After the round each participant's
//! buffer holds the elementwise sum over all participants.

use std::collections::HashMap;
use std::fmt::Debug;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};

use log::trace;
use num_complex::Complex64;
use num_traits::Zero;
use parking_lot::Mutex;

use crate::{exec_err, Result};

/// Describes the position of a participant within its reduction group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReducerSetup {
    /// Index of this participant within the group
    pub pos: usize,
    /// Number of participants in the group
    pub count: usize,
    /// Whether this participant keeps a materialized result after the
    /// reduction is committed
    pub have_result: bool,
}

/// Combines numeric buffers across all participants of a group, in place.
///
/// Implementations typically wrap a message passing library. The combination
/// must be elementwise and associative; all built-in implementations sum.
pub trait Reducer: Debug + Send + Sync {
    /// Returns this participant's position in the group
    fn setup(&self) -> ReducerSetup;

    /// Combines a buffer of real values across the group
    fn reduce_f64(&self, data: &mut [f64]) -> Result<()>;

    /// Combines a buffer of complex values across the group
    fn reduce_complex(&self, data: &mut [Complex64]) -> Result<()>;

    /// Combines a buffer of sample counts across the group
    fn reduce_count(&self, data: &mut [u64]) -> Result<()>;

    /// Finishes the current round. Calling it again within the same round is
    /// a no-op.
    fn commit(&self) -> Result<()>;
}

/// A group consisting of a single participant. Every reduction is the
/// identity and the participant always keeps its result.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReducer;

impl Reducer for NoopReducer {
    fn setup(&self) -> ReducerSetup {
        ReducerSetup {
            pos: 0,
            count: 1,
            have_result: true,
        }
    }

    fn reduce_f64(&self, _data: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn reduce_complex(&self, _data: &mut [Complex64]) -> Result<()> {
        Ok(())
    }

    fn reduce_count(&self, _data: &mut [u64]) -> Result<()> {
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }
}

/// Buffer contributed to one round of a [`LocalReducer`] group
#[derive(Debug)]
enum Slot {
    Real(Vec<f64>),
    Complex(Vec<Complex64>),
    Count(Vec<u64>),
}

#[derive(Debug)]
struct Round {
    slot: Slot,
    poisoned: bool,
}

/// Types a [`LocalReducer`] knows how to sum
trait Summand: Copy + Zero + AddAssign {
    const NAME: &'static str;

    fn new_slot(len: usize) -> Slot;

    fn values(slot: &mut Slot) -> Option<&mut Vec<Self>>;
}

impl Summand for f64 {
    const NAME: &'static str = "real";

    fn new_slot(len: usize) -> Slot {
        Slot::Real(vec![0.0; len])
    }

    fn values(slot: &mut Slot) -> Option<&mut Vec<Self>> {
        match slot {
            Slot::Real(v) => Some(v),
            _ => None,
        }
    }
}

impl Summand for Complex64 {
    const NAME: &'static str = "complex";

    fn new_slot(len: usize) -> Slot {
        Slot::Complex(vec![Complex64::zero(); len])
    }

    fn values(slot: &mut Slot) -> Option<&mut Vec<Self>> {
        match slot {
            Slot::Complex(v) => Some(v),
            _ => None,
        }
    }
}

impl Summand for u64 {
    const NAME: &'static str = "count";

    fn new_slot(len: usize) -> Slot {
        Slot::Count(vec![0; len])
    }

    fn values(slot: &mut Slot) -> Option<&mut Vec<Self>> {
        match slot {
            Slot::Count(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Shared {
    size: usize,
    barrier: Barrier,
    rounds: Mutex<HashMap<u64, Round>>,
}

/// A participant of an in-process reduction group.
///
/// Each participant is meant to be driven by its own thread, the way one
/// accumulator per worker thread is merged once every worker's stream has
/// ended. Every `reduce_*` call blocks until all participants of the group
/// have made the matching call. Participant `0` is the root and is the only
/// one reporting `have_result`.
#[derive(Debug)]
pub struct LocalReducer {
    pos: usize,
    shared: Arc<Shared>,
    round: AtomicU64,
    committed: AtomicBool,
    commits: AtomicU64,
}

impl LocalReducer {
    /// Creates the `size` participants of a new group
    pub fn group(size: usize) -> Vec<LocalReducer> {
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            rounds: Mutex::new(HashMap::new()),
        });
        (0..size)
            .map(|pos| LocalReducer {
                pos,
                shared: Arc::clone(&shared),
                round: AtomicU64::new(0),
                committed: AtomicBool::new(false),
                commits: AtomicU64::new(0),
            })
            .collect()
    }

    /// Number of rounds committed by this participant so far
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    fn combine<T: Summand>(&self, data: &mut [T]) -> Result<()> {
        self.committed.store(false, Ordering::Release);
        let round = self.round.fetch_add(1, Ordering::AcqRel);

        {
            let mut rounds = self.shared.rounds.lock();
            let entry = rounds.entry(round).or_insert_with(|| Round {
                slot: T::new_slot(data.len()),
                poisoned: false,
            });
            match T::values(&mut entry.slot) {
                Some(acc) if acc.len() == data.len() => {
                    for (a, v) in acc.iter_mut().zip(data.iter()) {
                        *a += *v;
                    }
                }
                _ => entry.poisoned = true,
            }
        }

        // all contributions are in
        self.shared.barrier.wait();

        let result = {
            let mut rounds = self.shared.rounds.lock();
            match rounds.get_mut(&round) {
                Some(entry) if !entry.poisoned => match T::values(&mut entry.slot) {
                    Some(acc) => {
                        data.copy_from_slice(acc);
                        Ok(())
                    }
                    None => exec_err!("Reduction round {round} lost its buffer"),
                },
                _ => exec_err!(
                    "Participants disagree on the {} buffer reduced in round {round}",
                    T::NAME
                ),
            }
        };

        // all participants have read the combined buffer
        if self.shared.barrier.wait().is_leader() {
            self.shared.rounds.lock().remove(&round);
        }
        trace!(
            "Participant {}/{} reduced {} {} values in round {round}",
            self.pos,
            self.shared.size,
            data.len(),
            T::NAME
        );
        result
    }
}

impl Reducer for LocalReducer {
    fn setup(&self) -> ReducerSetup {
        ReducerSetup {
            pos: self.pos,
            count: self.shared.size,
            have_result: self.pos == 0,
        }
    }

    fn reduce_f64(&self, data: &mut [f64]) -> Result<()> {
        self.combine(data)
    }

    fn reduce_complex(&self, data: &mut [Complex64]) -> Result<()> {
        self.combine(data)
    }

    fn reduce_count(&self, data: &mut [u64]) -> Result<()> {
        self.combine(data)
    }

    fn commit(&self) -> Result<()> {
        if !self.committed.swap(true, Ordering::AcqRel) {
            self.commits.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }
}
