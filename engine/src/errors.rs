// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of the status engine and of its persistence collaborator

use model::records::Revision;
use std::fmt::Display;
use thiserror::Error;
use tracectl::TraceCtlError;

/// Failures reported by a [`PersistenceGateway`](crate::gateway::PersistenceGateway)
#[derive(Debug, Error, PartialEq, Clone)]
pub enum StoreError {
    #[error("Write conflict on {key}: expected {expected:?}, found {found:?}")]
    Conflict {
        key: String,
        expected: Option<Revision>,
        found: Option<Revision>,
    },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The reasons why processing a signal may fail
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("Conflict writing {key} ({transition}): {source}")]
    Conflict {
        key: String,
        transition: String,
        source: StoreError,
    },
    #[error("Store error on {key}: {source}")]
    Store { key: String, source: StoreError },
    #[error("No such instance: {0}")]
    NoSuchInstance(String),
    #[error("Inconsistent state of {key}: {detail}")]
    Invariant { key: String, detail: String },
    #[error("Batch cancelled after {completed} tenant(s)")]
    Cancelled { completed: usize },
    #[error("Batch aborted after {completed} tenant(s): {source}")]
    BatchAborted {
        completed: usize,
        source: Box<EngineError>,
    },
    #[error("Invalid tracing configuration: {0}")]
    Tracing(#[from] TraceCtlError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Tell if the error means the store itself cannot be used
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Store { source, .. } => matches!(source, StoreError::Unavailable(_)),
            EngineError::BatchAborted { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Attach the key of the record being accessed to a [`StoreError`]
pub(crate) trait StoreContext<T> {
    fn at(self, key: &dyn Display) -> EngineResult<T>;
    fn writing(self, key: &dyn Display, transition: &dyn Display) -> EngineResult<T>;
}

impl<T> StoreContext<T> for StoreResult<T> {
    fn at(self, key: &dyn Display) -> EngineResult<T> {
        self.map_err(|source| EngineError::Store {
            key: key.to_string(),
            source,
        })
    }
    fn writing(self, key: &dyn Display, transition: &dyn Display) -> EngineResult<T> {
        self.map_err(|source| match source {
            StoreError::Conflict { .. } => EngineError::Conflict {
                key: key.to_string(),
                transition: transition.to_string(),
                source,
            },
            source => EngineError::Store {
                key: key.to_string(),
                source,
            },
        })
    }
}
