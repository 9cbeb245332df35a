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

use std::collections::HashMap;
use std::thread;

use binstat_binning::{BatchAccumulator, BatchResult, Circular, VarianceAccumulator};
use binstat_common::config::ConfigOptions;
use binstat_common::{
    BinstatError, LocalReducer, MemorySerializer, OwnedValue, Reducer, Result,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;

fn init() {
    let _ = env_logger::try_init();
}

/// First order autoregressive process `x[t] = phi * x[t - 1] + noise`
fn ar1(seed: u64, phi: f64, len: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = 0.0;
    (0..len)
        .map(|_| {
            x = phi * x + rng.random_range(-1.0..1.0);
            x
        })
        .collect()
}

fn naive_stderror(samples: &[f64]) -> Result<f64> {
    let mut acc = VarianceAccumulator::new(1, Circular);
    for x in samples {
        acc.add(&[*x], 1.0)?;
    }
    Ok(acc.finalize().stderror()[0])
}

#[test]
fn binning_detects_autocorrelation() -> Result<()> {
    init();
    let samples = ar1(1, 0.9, 1 << 16);

    let mut acc = BatchAccumulator::try_new(1, 64, 1)?;
    acc.extend(samples.iter().copied())?;
    assert_eq!(acc.current_batch_size(), 1024);
    let result = acc.finalize()?;

    // the error grows by sqrt((1 + phi) / (1 - phi)), about 4.4
    let binned = result.stderror()?[0];
    let naive = naive_stderror(&samples)?;
    assert!(binned > 2.0 * naive, "binned {binned}, naive {naive}");
    assert!(binned < 8.0 * naive, "binned {binned}, naive {naive}");
    Ok(())
}

#[test]
fn uncorrelated_stream_matches_naive_error() -> Result<()> {
    init();
    let samples = ar1(2, 0.0, 1 << 14);

    let mut acc = BatchAccumulator::try_new(1, 128, 1)?;
    acc.extend(samples.iter().copied())?;
    let binned = acc.finalize()?.stderror()?[0];
    let naive = naive_stderror(&samples)?;
    assert!(binned > 0.5 * naive && binned < 1.5 * naive, "binned {binned}, naive {naive}");
    Ok(())
}

#[rstest]
#[case(2)]
#[case(4)]
fn workers_combine_into_root(#[case] workers: usize) -> Result<()> {
    init();
    const LEN: usize = 3000;
    let group = LocalReducer::group(workers);
    let results = thread::scope(|s| {
        let handles: Vec<_> = group
            .iter()
            .map(|reducer| {
                s.spawn(move || {
                    let seed = reducer.setup().pos as u64;
                    let mut acc = BatchAccumulator::try_new(1, 16, 1)?;
                    acc.extend(ar1(seed, 0.5, LEN))?;
                    let mut result = acc.finalize()?;
                    result.reduce(reducer, true, true)?;
                    Ok::<_, BinstatError>(result)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Result<Vec<BatchResult<f64>>>>()
    })?;

    let root = &results[0];
    assert_eq!(root.count()?, (workers * LEN) as u64);
    let expected: f64 = (0..workers as u64)
        .flat_map(|seed| ar1(seed, 0.5, LEN))
        .sum::<f64>()
        / (workers * LEN) as f64;
    assert!((root.mean()?[0] - expected).abs() < 1e-12);
    assert!(results[1..].iter().all(|r| !r.is_valid()));

    let mut sink = MemorySerializer::new();
    root.serialize(&mut sink)?;
    assert_eq!(sink.get("count"), Some(&OwnedValue::Count((workers * LEN) as u64)));
    Ok(())
}

#[test]
fn accumulator_from_configuration() -> Result<()> {
    init();
    let settings = HashMap::from([
        ("binstat.binning.num_batches".to_string(), "8".to_string()),
        ("binstat.binning.base_size".to_string(), "4".to_string()),
    ]);
    let options = ConfigOptions::from_string_hash_map(&settings)?;

    let mut acc = BatchAccumulator::<f64>::try_from_options(2, &options.binning)?;
    for i in 0..64 {
        acc.add(&[f64::from(i), 1.0], 1)?;
    }
    assert_eq!(acc.num_batches(), 8);
    assert_eq!(acc.current_batch_size(), 8);
    assert_eq!(acc.storage()?.counts(), &[8; 8]);

    let result = acc.finalize()?;
    assert_eq!(result.mean()?, vec![31.5, 1.0]);
    assert_eq!(result.var(Circular)?[1], 0.0);
    Ok(())
}
