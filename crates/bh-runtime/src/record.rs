use std::collections::VecDeque;

use bh_core::{BehaviorError, IdentityKey, ObjectHandle, StackName};

use crate::{BehaviorRegistry, ObjectModel, RecordId, UseId};

/// One shared behavior per identity key.
///
/// Lives in the table exactly as long as it has at least one use. The bound
/// object is a lookup relation only; the host must flush it on delete.
#[derive(Debug)]
pub struct BehaviorRecord {
    pub(crate) key: IdentityKey,
    pub(crate) hash: u32,
    pub(crate) chain: Option<RecordId>,
    pub(crate) object: Option<ObjectHandle>,
    pub(crate) blocked: bool,
    /// Most recently attached first.
    pub(crate) uses: VecDeque<UseId>,
}

impl BehaviorRecord {
    pub(crate) fn new(key: IdentityKey, hash: u32) -> Self {
        Self {
            key,
            hash,
            chain: None,
            object: None,
            blocked: false,
            uses: VecDeque::new(),
        }
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn object_id(&self) -> u32 {
        self.key.object_id
    }

    pub fn object_stack(&self) -> &StackName {
        &self.key.stack_name
    }

    pub fn object(&self) -> Option<ObjectHandle> {
        self.object
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn uses(&self) -> impl Iterator<Item = UseId> + '_ {
        self.uses.iter().copied()
    }

    pub fn use_count(&self) -> usize {
        self.uses.len()
    }

    pub(crate) fn reserve_use_slot(&mut self) -> Result<(), BehaviorError> {
        self.uses
            .try_reserve(1)
            .map_err(|_| BehaviorError::alloc("behavior use list"))
    }
}

impl BehaviorRegistry {
    pub fn record(&self, record_id: RecordId) -> Option<&BehaviorRecord> {
        self.records.get(record_id)
    }

    /// Binds the record to `object`. Rebinding to the object it already
    /// holds does nothing.
    pub fn resolve<M: ObjectModel + ?Sized>(
        &mut self,
        record_id: RecordId,
        object: ObjectHandle,
        model: &mut M,
    ) -> Result<(), BehaviorError> {
        let record = self.record_mut(record_id)?;
        if record.object == Some(object) {
            return Ok(());
        }
        record.object = Some(object);
        record.blocked = false;
        tracing::trace!(record = %record_id, %object, "behavior resolved");

        model.set_is_behavior(object, true);

        let Some(stack) = model.owning_stack(object) else {
            return Ok(());
        };
        if !model.has_behaviors(stack) {
            model.set_has_behaviors(stack, true);
            if !model.is_mainstack(stack) {
                if let Some(mainstack) = model.mainstack_of(stack) {
                    model.set_has_behaviors(mainstack, true);
                }
            }
        }
        Ok(())
    }

    /// Marks a failed resolution so dispatch stops retrying it until the
    /// next successful `resolve`.
    pub fn block(&mut self, record_id: RecordId) -> Result<(), BehaviorError> {
        self.record_mut(record_id)?.blocked = true;
        Ok(())
    }

    /// Drops the object binding and every use's materialized variables. The
    /// record itself survives for later re-resolution.
    pub fn flush(&mut self, record_id: RecordId) -> Result<(), BehaviorError> {
        let record = self.record_mut(record_id)?;
        record.object = None;
        let uses: Vec<UseId> = record.uses.iter().copied().collect();
        tracing::trace!(record = %record_id, uses = uses.len(), "behavior flushed");
        for use_id in uses {
            if let Some(behavior_use) = self.uses.get_mut(use_id) {
                behavior_use.clear_locals();
            }
        }
        Ok(())
    }

    /// Rebuilds the super-use chain of every use of the record.
    pub fn reinherit<M: ObjectModel + ?Sized>(
        &mut self,
        record_id: RecordId,
        model: &mut M,
    ) -> Result<(), BehaviorError> {
        // `inherit` can acquire and release uses, so work from a snapshot and
        // skip any use that disappears along the way.
        let uses: Vec<UseId> = self.record_ref(record_id)?.uses().collect();
        for use_id in uses {
            let still_attached = self
                .records
                .get(record_id)
                .is_some_and(|record| record.uses.contains(&use_id));
            if still_attached {
                self.inherit(use_id, model)?;
            }
        }
        Ok(())
    }

    /// Long ids of every referrer currently using the record.
    pub fn copy_uses<M: ObjectModel + ?Sized>(
        &self,
        record_id: RecordId,
        model: &M,
    ) -> Result<Vec<String>, BehaviorError> {
        let record = self.record_ref(record_id)?;
        record
            .uses()
            .map(|use_id| {
                self.use_ref(use_id)
                    .map(|behavior_use| model.long_id(behavior_use.referrer))
            })
            .collect()
    }

    /// Flushes whichever record is bound to `object`. Call before the object
    /// is deleted, renamed or re-owned.
    pub fn flush_object(&mut self, object: ObjectHandle) {
        if let Some(record_id) = self.lookup(object) {
            if let Err(error) = self.flush(record_id) {
                tracing::warn!(%error, %object, "flush of a looked-up record failed");
            }
        }
    }

    /// Flushes every record bound to an object on `stack`.
    pub fn flush_stack<M: ObjectModel + ?Sized>(&mut self, stack: ObjectHandle, model: &M) {
        let bound: Vec<RecordId> = self
            .record_ids()
            .into_iter()
            .filter(|record_id| {
                self.records
                    .get(*record_id)
                    .and_then(|record| record.object)
                    .is_some_and(|object| model.owning_stack(object) == Some(stack))
            })
            .collect();
        for record_id in bound {
            if let Err(error) = self.flush(record_id) {
                tracing::warn!(%error, %stack, "flush of a linked record failed");
            }
        }
    }

    pub(crate) fn attach(&mut self, record_id: RecordId, use_id: UseId) {
        if let Some(record) = self.records.get_mut(record_id) {
            record.uses.push_front(use_id);
        }
    }

    /// Unhooks a use; destroys the record once it has none left.
    pub(crate) fn detach<M: ObjectModel + ?Sized>(
        &mut self,
        record_id: RecordId,
        use_id: UseId,
        model: &mut M,
    ) {
        let Some(record) = self.records.get_mut(record_id) else {
            return;
        };
        if let Some(position) = record.uses.iter().position(|id| *id == use_id) {
            record.uses.remove(position);
        }
        if !record.uses.is_empty() {
            return;
        }

        self.remove_from_table(record_id);
        if let Some(record) = self.records.remove(record_id) {
            if let Some(object) = record.object {
                model.set_is_behavior(object, false);
            }
            tracing::debug!(
                record = %record_id,
                key = %record.key,
                occupancy = self.occupancy,
                "behavior record destroyed"
            );
        }
    }
}
