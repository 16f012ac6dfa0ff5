use bh_core::{BehaviorError, ObjectHandle, Variable, VariableDecl, VariableRef};

use crate::{BehaviorRegistry, ObjectModel, RecordId, UseId};

/// One referrer's binding to a behavior record.
///
/// Owns its script-local variables (materialized on first access) and,
/// when the behavior object has a behavior of its own, a super-use one
/// level further up.
#[derive(Debug)]
pub struct BehaviorUse {
    pub(crate) record: RecordId,
    pub(crate) referrer: ObjectHandle,
    pub(crate) super_use: Option<UseId>,
    pub(crate) locals: Option<Vec<VariableRef>>,
}

impl BehaviorUse {
    pub(crate) fn new(record: RecordId, referrer: ObjectHandle) -> Self {
        Self {
            record,
            referrer,
            super_use: None,
            locals: None,
        }
    }

    pub fn record(&self) -> RecordId {
        self.record
    }

    pub fn referrer(&self) -> ObjectHandle {
        self.referrer
    }

    pub fn super_use(&self) -> Option<UseId> {
        self.super_use
    }

    pub fn local_count(&self) -> usize {
        self.locals.as_ref().map_or(0, Vec::len)
    }

    pub fn is_materialized(&self) -> bool {
        self.locals.is_some()
    }

    pub(crate) fn clear_locals(&mut self) {
        self.locals = None;
    }
}

impl BehaviorRegistry {
    pub fn behavior_use(&self, use_id: UseId) -> Option<&BehaviorUse> {
        self.uses.get(use_id)
    }

    /// Returns this use's own instance of variable slot `index`, building
    /// the whole local array from the behavior's compiled variables on first
    /// access. The record must be resolved at that point.
    pub fn get_variable<M: ObjectModel + ?Sized>(
        &mut self,
        use_id: UseId,
        index: usize,
        model: &M,
    ) -> Result<VariableRef, BehaviorError> {
        let behavior_use = self.use_ref(use_id)?;
        if let Some(locals) = &behavior_use.locals {
            return locals
                .get(index)
                .cloned()
                .ok_or(BehaviorError::VariableIndex {
                    index,
                    count: locals.len(),
                });
        }

        let record = self.record_ref(behavior_use.record)?;
        let object = record.object.ok_or_else(|| BehaviorError::Unresolved {
            key: record.key.clone(),
        })?;

        let decls = model.script_variables(object);
        let mut locals = Vec::new();
        locals
            .try_reserve_exact(decls.len())
            .map_err(|_| BehaviorError::alloc("behavior locals"))?;
        locals.extend(decls.iter().map(Variable::from_decl));

        let count = locals.len();
        let found = locals.get(index).cloned();
        self.use_mut(use_id)?.locals = Some(locals);
        found.ok_or(BehaviorError::VariableIndex { index, count })
    }

    pub fn local_count(&self, use_id: UseId) -> usize {
        self.uses.get(use_id).map_or(0, BehaviorUse::local_count)
    }

    /// Frees the materialized locals; the next access rebuilds them from
    /// the initializers current at that time.
    pub fn clear_vars(&mut self, use_id: UseId) -> Result<(), BehaviorError> {
        self.use_mut(use_id)?.clear_locals();
        Ok(())
    }

    /// Carries live variables across a recompile that renumbered slots.
    ///
    /// `remap[old]` names the new slot for an old one, or `None` when the
    /// variable went away. Slots nothing maps to are seeded from `layout`.
    /// Uses that never materialized are left alone, and an empty layout
    /// leaves the use unmaterialized.
    pub fn preserve_vars(
        &mut self,
        use_id: UseId,
        remap: &[Option<usize>],
        layout: &[VariableDecl],
    ) -> Result<(), BehaviorError> {
        let behavior_use = self.use_mut(use_id)?;
        if behavior_use.local_count() == 0 || layout.is_empty() {
            behavior_use.locals = None;
            return Ok(());
        }

        let mut slots: Vec<Option<VariableRef>> = Vec::new();
        slots
            .try_reserve_exact(layout.len())
            .map_err(|_| BehaviorError::alloc("behavior locals"))?;
        slots.resize(layout.len(), None);

        let old = behavior_use.locals.take().unwrap_or_default();
        for (old_index, variable) in old.into_iter().enumerate() {
            let Some(Some(new_index)) = remap.get(old_index) else {
                continue;
            };
            if let Some(slot) = slots.get_mut(*new_index) {
                if slot.is_none() {
                    *slot = Some(variable);
                }
            }
        }

        let locals = slots
            .into_iter()
            .zip(layout)
            .map(|(slot, decl)| slot.unwrap_or_else(|| Variable::from_decl(decl)))
            .collect();
        behavior_use.locals = Some(locals);
        Ok(())
    }

    /// Applies [`preserve_vars`](Self::preserve_vars) to every use of the
    /// record bound to `object`.
    pub fn preserve_vars_for(
        &mut self,
        object: ObjectHandle,
        remap: &[Option<usize>],
        layout: &[VariableDecl],
    ) -> Result<(), BehaviorError> {
        let Some(record_id) = self.lookup(object) else {
            return Ok(());
        };
        let uses: Vec<UseId> = self.record_ref(record_id)?.uses().collect();
        for use_id in uses {
            self.preserve_vars(use_id, remap, layout)?;
        }
        Ok(())
    }

    pub fn clear_vars_for(&mut self, object: ObjectHandle) {
        let Some(record_id) = self.lookup(object) else {
            return;
        };
        let uses: Vec<UseId> = self
            .records
            .get(record_id)
            .map(|record| record.uses().collect())
            .unwrap_or_default();
        for use_id in uses {
            if let Some(behavior_use) = self.uses.get_mut(use_id) {
                behavior_use.clear_locals();
            }
        }
    }

    /// Creates an independent use of the same record for `new_referrer`,
    /// duplicating the super-use chain to the same depth. Variables are not
    /// copied; the clone materializes its own.
    pub fn clone_use(
        &mut self,
        use_id: UseId,
        new_referrer: ObjectHandle,
    ) -> Result<UseId, BehaviorError> {
        let (record_id, super_use) = {
            let behavior_use = self.use_ref(use_id)?;
            (behavior_use.record, behavior_use.super_use)
        };

        self.record_mut(record_id)?.reserve_use_slot()?;
        let new_id = self
            .uses
            .try_insert(BehaviorUse::new(record_id, new_referrer))?;

        if let Some(super_use) = super_use {
            match self.clone_use(super_use, new_referrer) {
                Ok(new_super) => {
                    self.use_mut(new_id)?.super_use = Some(new_super);
                }
                Err(error) => {
                    // Not attached yet, so dropping it is enough.
                    self.uses.remove(new_id);
                    return Err(error);
                }
            }
        }

        self.attach(record_id, new_id);
        Ok(new_id)
    }

    /// Rebuilds the super-use chain below `use_id` from the current
    /// behavior-of-behavior relation.
    ///
    /// The old chain is released first. On failure at any depth the super
    /// link is left empty; the old chain is not restored.
    pub fn inherit<M: ObjectModel + ?Sized>(
        &mut self,
        use_id: UseId,
        model: &mut M,
    ) -> Result<(), BehaviorError> {
        self.inherit_at(use_id, model, 0)
    }

    fn inherit_at<M: ObjectModel + ?Sized>(
        &mut self,
        use_id: UseId,
        model: &mut M,
        depth: usize,
    ) -> Result<(), BehaviorError> {
        if let Some(old_super) = self.use_mut(use_id)?.super_use.take() {
            self.release(old_super, model)?;
        }

        let (record_id, referrer) = {
            let behavior_use = self.use_ref(use_id)?;
            (behavior_use.record, behavior_use.referrer)
        };
        let Some(object) = self.record_ref(record_id)?.object else {
            return Ok(());
        };
        let Some(super_record) = model
            .declared_behavior(object)
            .and_then(|declared| self.uses.get(declared))
            .map(|declared| declared.record)
        else {
            return Ok(());
        };

        if depth >= self.options.max_inherit_depth {
            return Err(BehaviorError::InheritanceTooDeep {
                limit: self.options.max_inherit_depth,
            });
        }

        self.record_mut(super_record)?.reserve_use_slot()?;
        let super_use = self
            .uses
            .try_insert(BehaviorUse::new(super_record, referrer))?;

        if let Err(error) = self.inherit_at(super_use, model, depth + 1) {
            self.uses.remove(super_use);
            return Err(error);
        }

        self.attach(super_record, super_use);
        self.use_mut(use_id)?.super_use = Some(super_use);
        tracing::trace!(use_id = %use_id, super_use = %super_use, depth, "behavior inherited");
        Ok(())
    }

    /// Detaches the use, releasing its super-use chain first. The record is
    /// destroyed along with its last use.
    pub fn release<M: ObjectModel + ?Sized>(
        &mut self,
        use_id: UseId,
        model: &mut M,
    ) -> Result<(), BehaviorError> {
        let behavior_use = self
            .uses
            .remove(use_id)
            .ok_or(BehaviorError::StaleUse {
                index: use_id.index(),
            })?;
        if let Some(super_use) = behavior_use.super_use {
            self.release(super_use, model)?;
        }
        self.detach(behavior_use.record, use_id, model);
        Ok(())
    }
}
