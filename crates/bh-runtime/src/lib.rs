//! Behavior resolution: a registry of shared behavior records keyed by a
//! rugged `(object id, stack name)` identity, with per-referrer uses that
//! carry their own script-local variables and a super-use chain for
//! multi-level inheritance.

use bh_core::{BehaviorError, ObjectHandle, VariableDecl};

mod arena;
mod dispatch;
mod record;
mod table;
mod usage;

pub use arena::{RecordId, SlotKey, UseId};
pub use dispatch::{BehaviorChain, ChainLink};
pub use record::BehaviorRecord;
pub use usage::BehaviorUse;

use arena::Arena;

pub const DEFAULT_MIN_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_INHERIT_DEPTH: usize = 255;

/// The object-model services the registry calls back into.
///
/// Every method is a lookup or a flag write; the registry never keeps a
/// borrow of the model between calls.
pub trait ObjectModel {
    /// Stack that owns `object`; a stack owns itself.
    fn owning_stack(&self, object: ObjectHandle) -> Option<ObjectHandle>;
    fn is_mainstack(&self, stack: ObjectHandle) -> bool;
    fn mainstack_of(&self, stack: ObjectHandle) -> Option<ObjectHandle>;
    fn has_behaviors(&self, stack: ObjectHandle) -> bool;
    fn set_has_behaviors(&mut self, stack: ObjectHandle, value: bool);
    fn is_behavior(&self, object: ObjectHandle) -> bool;
    fn set_is_behavior(&mut self, object: ObjectHandle, value: bool);
    /// The use `object` itself holds on its own behavior, if it declares one.
    fn declared_behavior(&self, object: ObjectHandle) -> Option<UseId>;
    /// Compiled script-local variables of `object`, in slot order.
    fn script_variables(&self, object: ObjectHandle) -> &[VariableDecl];
    fn long_id(&self, object: ObjectHandle) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Initial bucket count and the floor shrinking stops at. Power of two.
    pub min_capacity: usize,
    pub record_limit: Option<usize>,
    pub use_limit: Option<usize>,
    pub max_inherit_depth: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            min_capacity: DEFAULT_MIN_CAPACITY,
            record_limit: None,
            use_limit: None,
            max_inherit_depth: DEFAULT_MAX_INHERIT_DEPTH,
        }
    }
}

#[derive(Debug)]
pub struct BehaviorRegistry {
    pub(crate) options: RegistryOptions,
    pub(crate) buckets: Vec<Option<RecordId>>,
    pub(crate) occupancy: usize,
    pub(crate) records: Arena<RecordId, BehaviorRecord>,
    pub(crate) uses: Arena<UseId, BehaviorUse>,
}

impl BehaviorRegistry {
    pub fn new(options: RegistryOptions) -> Result<Self, BehaviorError> {
        if options.min_capacity == 0 || !options.min_capacity.is_power_of_two() {
            return Err(BehaviorError::InvalidOptions(format!(
                "min_capacity must be a non-zero power of two, got {}",
                options.min_capacity
            )));
        }

        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(options.min_capacity)
            .map_err(|_| BehaviorError::alloc("behavior table"))?;
        buckets.resize(options.min_capacity, None);

        Ok(Self {
            records: Arena::new("behavior record", options.record_limit),
            uses: Arena::new("behavior use", options.use_limit),
            buckets,
            occupancy: 0,
            options,
        })
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy
    }

    pub fn use_count(&self) -> usize {
        self.uses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy == 0
    }

    /// Tears the table down to its initial state. Any use still held by a
    /// referrer becomes stale.
    pub fn cleanup(&mut self) {
        if self.occupancy > 0 {
            tracing::debug!(
                records = self.occupancy,
                uses = self.uses.len(),
                "behavior registry cleaned up with live records"
            );
        }
        self.records.clear();
        self.uses.clear();
        self.buckets.clear();
        self.buckets.resize(self.options.min_capacity, None);
        self.occupancy = 0;
    }

    pub(crate) fn record_ref(&self, id: RecordId) -> Result<&BehaviorRecord, BehaviorError> {
        self.records
            .get(id)
            .ok_or(BehaviorError::StaleRecord { index: id.index() })
    }

    pub(crate) fn record_mut(
        &mut self,
        id: RecordId,
    ) -> Result<&mut BehaviorRecord, BehaviorError> {
        self.records
            .get_mut(id)
            .ok_or(BehaviorError::StaleRecord { index: id.index() })
    }

    pub(crate) fn use_ref(&self, id: UseId) -> Result<&BehaviorUse, BehaviorError> {
        self.uses
            .get(id)
            .ok_or(BehaviorError::StaleUse { index: id.index() })
    }

    pub(crate) fn use_mut(&mut self, id: UseId) -> Result<&mut BehaviorUse, BehaviorError> {
        self.uses
            .get_mut(id)
            .ok_or(BehaviorError::StaleUse { index: id.index() })
    }
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self {
            options: RegistryOptions::default(),
            buckets: vec![None; DEFAULT_MIN_CAPACITY],
            occupancy: 0,
            records: Arena::new("behavior record", None),
            uses: Arena::new("behavior use", None),
        }
    }
}

impl Drop for BehaviorRegistry {
    fn drop(&mut self) {
        if self.occupancy > 0 {
            tracing::debug!(
                records = self.occupancy,
                uses = self.uses.len(),
                "behavior registry dropped with live records"
            );
        }
    }
}

#[cfg(test)]
mod tests;
