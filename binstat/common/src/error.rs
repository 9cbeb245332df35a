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

//! binstat error types

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

/// Result type for operations that could result in an [BinstatError]
pub type Result<T> = result::Result<T, BinstatError>;

/// Error type for generic operations that could result in BinstatError::External
pub type GenericError = Box<dyn error::Error + Send + Sync>;

/// binstat error
#[derive(Debug)]
pub enum BinstatError {
    /// Error associated to I/O operations, typically raised by archive
    /// adapters implementing [`Serializer`](crate::serialize::Serializer).
    IoError(io::Error),
    /// An accumulator or result was constructed with parameters that can
    /// never work, e.g. an odd number of batches. Never retried.
    Configuration(String),
    /// An operation was invoked on an accumulator or result whose storage
    /// has already been moved out by `finalize` or released by `reduce`.
    /// The caller has to reset or reconstruct.
    InvalidState(String),
    /// Error returned while feeding data, for example an observation whose
    /// length does not match the accumulator's element size.
    Execution(String),
    /// Error returned as a consequence of an error in binstat.
    /// This error should not happen in normal usage.
    // binstat has internal invariants that we are unable to ask the compiler to check for us.
    // This error is raised when one of those invariants is not verified during execution.
    Internal(String),
    /// Wraps an error with additional context, e.g. the configuration key
    /// whose value failed to parse.
    Context(String, Box<BinstatError>),
    /// Errors originating from outside binstat's core codebase, for example
    /// a reducer backed by a message passing library.
    External(GenericError),
}

impl BinstatError {
    /// Wraps this error with a context message
    pub fn context(self, description: impl Into<String>) -> Self {
        Self::Context(description.into(), Box::new(self))
    }

    /// Returns the innermost error, skipping any [`BinstatError::Context`]
    pub fn find_root(&self) -> &Self {
        let mut root = self;
        while let BinstatError::Context(_, inner) = root {
            root = inner;
        }
        root
    }
}

impl From<io::Error> for BinstatError {
    fn from(e: io::Error) -> Self {
        BinstatError::IoError(e)
    }
}

impl From<GenericError> for BinstatError {
    fn from(err: GenericError) -> Self {
        BinstatError::External(err)
    }
}

impl Display for BinstatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            BinstatError::IoError(ref desc) => write!(f, "IO error: {desc}"),
            BinstatError::Configuration(ref desc) => {
                write!(f, "Invalid configuration: {desc}")
            }
            BinstatError::InvalidState(ref desc) => {
                write!(f, "Invalid state: {desc}")
            }
            BinstatError::Execution(ref desc) => {
                write!(f, "Execution error: {desc}")
            }
            BinstatError::Internal(ref desc) => {
                write!(f, "Internal error: {desc}. This was likely caused by a bug in binstat's \
                    code and we would welcome that you file an bug report in our issue tracker")
            }
            BinstatError::Context(ref desc, ref err) => {
                write!(f, "{desc}\ncaused by\n{}", *err)
            }
            BinstatError::External(ref desc) => {
                write!(f, "External error: {desc}")
            }
        }
    }
}

impl error::Error for BinstatError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            BinstatError::IoError(e) => Some(e),
            BinstatError::Context(_, e) => Some(e.as_ref()),
            BinstatError::External(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Returns `Err(BinstatError::Configuration(..))` with a formatted message
#[macro_export]
macro_rules! config_err {
    ($($arg:tt)*) => {
        Err($crate::error::BinstatError::Configuration(format!($($arg)*)))
    };
}

/// Returns `Err(BinstatError::InvalidState(..))` with a formatted message
#[macro_export]
macro_rules! invalid_state_err {
    ($($arg:tt)*) => {
        Err($crate::error::BinstatError::InvalidState(format!($($arg)*)))
    };
}

/// Returns `Err(BinstatError::Execution(..))` with a formatted message
#[macro_export]
macro_rules! exec_err {
    ($($arg:tt)*) => {
        Err($crate::error::BinstatError::Execution(format!($($arg)*)))
    };
}

/// Returns `Err(BinstatError::Internal(..))` with a formatted message
#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => {
        Err($crate::error::BinstatError::Internal(format!($($arg)*)))
    };
}
