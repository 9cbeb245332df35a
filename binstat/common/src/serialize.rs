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

//! [`Serializer`]: write adapter for hierarchical archives.
//!
//! Keys are `/` separated paths such as `mean/value`. The archive format
//! itself lives outside this crate; [`MemorySerializer`] keeps everything
//! in memory and is what tests and simple drivers use.

use std::collections::BTreeMap;

use num_complex::Complex64;

use crate::{exec_err, Result};

/// A value borrowed for writing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// A single integer
    Count(u64),
    /// A sequence of integers
    Counts(&'a [u64]),
    /// A sequence of real numbers
    Real(&'a [f64]),
    /// A sequence of complex numbers
    Complex(&'a [Complex64]),
}

impl Value<'_> {
    /// Copies the borrowed data into an [`OwnedValue`]
    pub fn to_owned_value(&self) -> OwnedValue {
        match *self {
            Value::Count(c) => OwnedValue::Count(c),
            Value::Counts(c) => OwnedValue::Counts(c.to_vec()),
            Value::Real(r) => OwnedValue::Real(r.to_vec()),
            Value::Complex(z) => OwnedValue::Complex(z.to_vec()),
        }
    }
}

/// An owned copy of a written [`Value`]
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
    /// A single integer
    Count(u64),
    /// A sequence of integers
    Counts(Vec<u64>),
    /// A sequence of real numbers
    Real(Vec<f64>),
    /// A sequence of complex numbers
    Complex(Vec<Complex64>),
}

/// Sink for hierarchical key → value data
pub trait Serializer {
    /// Writes `value` under `key`
    fn write(&mut self, key: &str, value: Value<'_>) -> Result<()>;
}

/// A [`Serializer`] collecting everything into an ordered map
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemorySerializer {
    entries: BTreeMap<String, OwnedValue>,
}

impl MemorySerializer {
    /// Creates an empty serializer
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value written under `key`, if any
    pub fn get(&self, key: &str) -> Option<&OwnedValue> {
        self.entries.get(key)
    }

    /// Iterates over keys in lexicographic order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of keys written
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serializer for MemorySerializer {
    fn write(&mut self, key: &str, value: Value<'_>) -> Result<()> {
        if key.is_empty() || key.split('/').any(str::is_empty) {
            return exec_err!("Invalid archive key \"{key}\"");
        }
        // a key must not be both a group and a leaf
        let group = format!("{key}/");
        if self.entries.keys().any(|k| {
            k.starts_with(&group) || key.starts_with(&format!("{k}/"))
        }) {
            return exec_err!("Archive key \"{key}\" conflicts with an existing entry");
        }
        self.entries.insert(key.to_string(), value.to_owned_value());
        Ok(())
    }
}
