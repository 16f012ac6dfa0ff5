use std::collections::TryReserveError;

use thiserror::Error;

use crate::types::{IdentityKey, ObjectHandle};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BehaviorError {
    #[error("out of memory while allocating {what}")]
    Alloc { what: &'static str },
    #[error("behavior use #{index} is no longer live")]
    StaleUse { index: u32 },
    #[error("behavior record #{index} is no longer live")]
    StaleRecord { index: u32 },
    #[error("behavior {key} is not resolved to an object")]
    Unresolved { key: IdentityKey },
    #[error("variable slot {index} out of range ({count} slots)")]
    VariableIndex { index: usize, count: usize },
    #[error("behavior inheritance deeper than {limit} levels")]
    InheritanceTooDeep { limit: usize },
    #[error("object {0} not found")]
    ObjectNotFound(ObjectHandle),
    #[error("object {target} already inherits from {object}")]
    CyclicBehavior {
        object: ObjectHandle,
        target: ObjectHandle,
    },
    #[error("object {0} cannot be used as a behavior")]
    InvalidBehaviorTarget(ObjectHandle),
    #[error("object id {id} already exists in stack \"{stack}\"")]
    DuplicateObject { id: u32, stack: String },
    #[error("object {object} cannot be placed inside {owner}")]
    InvalidOwner {
        object: ObjectHandle,
        owner: ObjectHandle,
    },
    #[error("invalid registry options: {0}")]
    InvalidOptions(String),
}

impl BehaviorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Alloc { .. } => "BEHAVIOR_ALLOC",
            Self::StaleUse { .. } => "BEHAVIOR_STALE_USE",
            Self::StaleRecord { .. } => "BEHAVIOR_STALE_RECORD",
            Self::Unresolved { .. } => "BEHAVIOR_UNRESOLVED",
            Self::VariableIndex { .. } => "BEHAVIOR_VARIABLE_INDEX",
            Self::InheritanceTooDeep { .. } => "BEHAVIOR_INHERIT_DEPTH",
            Self::ObjectNotFound(_) => "BEHAVIOR_OBJECT_NOT_FOUND",
            Self::CyclicBehavior { .. } => "BEHAVIOR_CYCLIC_OBJECT",
            Self::InvalidBehaviorTarget(_) => "BEHAVIOR_BAD_OBJECT",
            Self::DuplicateObject { .. } => "BEHAVIOR_DUPLICATE_OBJECT",
            Self::InvalidOwner { .. } => "BEHAVIOR_BAD_OWNER",
            Self::InvalidOptions(_) => "BEHAVIOR_OPTIONS",
        }
    }

    pub fn alloc(what: &'static str) -> Self {
        Self::Alloc { what }
    }

    pub fn is_alloc(&self) -> bool {
        matches!(self, Self::Alloc { .. })
    }
}

impl From<TryReserveError> for BehaviorError {
    fn from(_: TryReserveError) -> Self {
        Self::alloc("storage")
    }
}
