use bh_core::ObjectHandle;

use crate::{BehaviorRegistry, RecordId, UseId};

/// One resolved step of a referrer's behavior chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub use_id: UseId,
    pub record: RecordId,
    pub object: ObjectHandle,
}

/// Follows super-uses from a referrer's own use, yielding each resolved
/// behavior object. Stops at the top of the chain or at the first link whose
/// record is unbound, which handler lookup treats as "no further behavior".
pub struct BehaviorChain<'a> {
    registry: &'a BehaviorRegistry,
    next: Option<UseId>,
}

impl Iterator for BehaviorChain<'_> {
    type Item = ChainLink;

    fn next(&mut self) -> Option<ChainLink> {
        let use_id = self.next.take()?;
        let behavior_use = self.registry.uses.get(use_id)?;
        let record = behavior_use.record;
        let object = self.registry.records.get(record)?.object?;
        self.next = behavior_use.super_use;
        Some(ChainLink {
            use_id,
            record,
            object,
        })
    }
}

impl BehaviorRegistry {
    pub fn chain(&self, first: Option<UseId>) -> BehaviorChain<'_> {
        BehaviorChain {
            registry: self,
            next: first,
        }
    }

    pub fn get_parent(&self, use_id: UseId) -> Option<RecordId> {
        self.uses.get(use_id).map(|behavior_use| behavior_use.record)
    }

    /// The bound object, or `None` while the behavior is unresolved.
    pub fn get_object(&self, record_id: RecordId) -> Option<ObjectHandle> {
        self.records.get(record_id).and_then(|record| record.object)
    }

    pub fn get_super(&self, use_id: UseId) -> Option<UseId> {
        self.uses
            .get(use_id)
            .and_then(|behavior_use| behavior_use.super_use)
    }

    pub fn get_referrer(&self, use_id: UseId) -> Option<ObjectHandle> {
        self.uses.get(use_id).map(|behavior_use| behavior_use.referrer)
    }

    pub fn parent_object(&self, use_id: UseId) -> Option<ObjectHandle> {
        self.get_parent(use_id)
            .and_then(|record_id| self.get_object(record_id))
    }

    pub fn is_blocked(&self, record_id: RecordId) -> bool {
        self.records
            .get(record_id)
            .is_some_and(|record| record.blocked)
    }
}
