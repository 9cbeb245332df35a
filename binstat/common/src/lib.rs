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

//! Common functionality for binstat
//!
//! This crate contains the error type, runtime configuration and the
//! collaborator interfaces (reduction across workers, archive writing) used by
//! the binning accumulators. They are kept in their own crate so that drivers
//! and collaborator implementations do not depend on the accumulators.

#![cfg_attr(docsrs, feature(doc_cfg))]
// Make sure fast / cheap clones on Arc are explicit
#![deny(clippy::clone_on_ref_ptr)]

pub mod config;
pub mod element;
pub mod error;
pub mod reduce;
pub mod serialize;

pub use element::{Element, Moment};
pub use error::{BinstatError, GenericError, Result};
pub use reduce::{LocalReducer, NoopReducer, Reducer, ReducerSetup};
pub use serialize::{MemorySerializer, OwnedValue, Serializer, Value};

/// Re-export of the complex element type accepted by the accumulators
pub use num_complex::Complex64;
