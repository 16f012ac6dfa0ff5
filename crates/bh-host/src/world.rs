use bh_core::{BehaviorError, ObjectHandle, VariableRef};
use bh_runtime::{BehaviorRegistry, ObjectModel, RegistryOptions, UseId};

use crate::object::{HostObject, ObjectKind, ObjectStore};
use crate::script::Script;

/// The object hierarchy together with its behavior registry.
///
/// Owns both so every collaborator duty (flush on delete, reinherit after
/// assignment, remap on recompile) happens next to the mutation that needs
/// it.
#[derive(Debug)]
pub struct World {
    pub(crate) store: ObjectStore,
    pub(crate) behaviors: BehaviorRegistry,
}

impl World {
    pub fn new(options: RegistryOptions) -> Result<Self, BehaviorError> {
        Ok(Self {
            store: ObjectStore::default(),
            behaviors: BehaviorRegistry::new(options)?,
        })
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.behaviors
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&HostObject> {
        self.store.get(handle)
    }

    pub fn long_id(&self, handle: ObjectHandle) -> String {
        self.store.long_id(handle)
    }

    /// Creates a stack; `mainstack` makes it a substack of that stack.
    pub fn create_stack(
        &mut self,
        name: impl Into<String>,
        mainstack: Option<ObjectHandle>,
    ) -> Result<ObjectHandle, BehaviorError> {
        if let Some(mainstack) = mainstack {
            self.store.require(mainstack)?;
        }
        Ok(self
            .store
            .insert(HostObject::new(0, name.into(), ObjectKind::Stack, mainstack)))
    }

    pub fn create_object(
        &mut self,
        owner: ObjectHandle,
        kind: ObjectKind,
        id: u32,
        name: impl Into<String>,
    ) -> Result<ObjectHandle, BehaviorError> {
        let stack = self
            .store
            .owning_stack(owner)
            .ok_or(BehaviorError::ObjectNotFound(owner))?;
        if id == 0 || self.store.find_control(stack, id).is_some() {
            let stack_name = self.store.require(stack)?.name.clone();
            return Err(BehaviorError::DuplicateObject {
                id,
                stack: stack_name,
            });
        }
        Ok(self
            .store
            .insert(HostObject::new(id, name.into(), kind, Some(owner))))
    }

    pub fn find_object(&self, stack_name: &str, id: Option<u32>) -> Option<ObjectHandle> {
        let stack = self.store.find_stack(stack_name)?;
        self.store.find_control(stack, id.unwrap_or(0))
    }

    /// Installs a recompiled script. Live behavior variables follow their
    /// names into the new slot layout; an object with no previous variables
    /// just drops whatever its uses had materialized.
    pub fn set_script(
        &mut self,
        object: ObjectHandle,
        script: Script,
    ) -> Result<(), BehaviorError> {
        let current = self.store.require(object)?;
        let is_behavior = current.is_behavior;
        let had_variables = !current.script.variables.is_empty();
        let remap = current.script.remap_to(&script);

        if is_behavior {
            if had_variables {
                self.behaviors
                    .preserve_vars_for(object, &remap, &script.variables)?;
            } else {
                self.behaviors.clear_vars_for(object);
            }
        }

        let target = self.store.require_mut(object)?;
        target.script = script;
        target.reset_locals();
        Ok(())
    }

    /// Points `object`'s behavior at `target`, or clears it with `None`.
    pub fn set_behavior(
        &mut self,
        object: ObjectHandle,
        target: Option<ObjectHandle>,
    ) -> Result<(), BehaviorError> {
        let current = self.store.require(object)?.behavior;

        let Some(target) = target else {
            if let Some(old) = current {
                self.store.require_mut(object)?.behavior = None;
                self.behaviors.release(old, &mut self.store)?;
                self.reinherit_users(object)?;
            }
            return Ok(());
        };

        if current.and_then(|use_id| self.behaviors.parent_object(use_id)) == Some(target) {
            return Ok(());
        }

        let target_object = self.store.require(target)?;
        if !target_object.kind.can_be_behavior() {
            return Err(BehaviorError::InvalidBehaviorTarget(target));
        }
        self.check_cycle(object, target)?;

        let stack = self
            .store
            .owning_stack(target)
            .ok_or(BehaviorError::ObjectNotFound(target))?;
        let stack_name = self.store.require(stack)?.name.clone();
        let id = self
            .store
            .behavior_id(target)
            .ok_or(BehaviorError::ObjectNotFound(target))?;

        let use_id = self.behaviors.acquire(object, id, stack_name)?;
        let record = self
            .behaviors
            .get_parent(use_id)
            .ok_or(BehaviorError::StaleUse {
                index: use_id.index(),
            })?;
        self.behaviors.resolve(record, target, &mut self.store)?;
        let inherited = self.behaviors.inherit(use_id, &mut self.store);

        if let Some(old) = current {
            self.behaviors.release(old, &mut self.store)?;
        }
        self.store.require_mut(object)?.behavior = Some(use_id);
        inherited?;
        self.reinherit_users(object)?;
        tracing::debug!(
            object = %self.store.long_id(object),
            behavior = %self.store.long_id(target),
            "behavior assigned"
        );
        Ok(())
    }

    /// Anything inheriting from `object` has a different chain above it now.
    fn reinherit_users(&mut self, object: ObjectHandle) -> Result<(), BehaviorError> {
        if !self.store.require(object)?.is_behavior {
            return Ok(());
        }
        match self.behaviors.lookup(object) {
            Some(record) => self.behaviors.reinherit(record, &mut self.store),
            None => Ok(()),
        }
    }

    /// Records a behavior reference by identity without resolving it, as a
    /// stack loader does before the target stack may be open.
    pub fn set_behavior_reference(
        &mut self,
        object: ObjectHandle,
        id: u32,
        stack_name: &str,
    ) -> Result<UseId, BehaviorError> {
        self.store.require(object)?;
        let use_id = self.behaviors.acquire(object, id, stack_name)?;
        let target = self.store.require_mut(object)?;
        let old = target.behavior.replace(use_id);
        if let Some(old) = old {
            self.behaviors.release(old, &mut self.store)?;
        }
        Ok(use_id)
    }

    /// Resolves `object`'s behavior by identity, then the behavior's own,
    /// and builds the super-use chain. A reference that cannot be found is
    /// blocked until it next resolves.
    pub fn resolve_behavior(&mut self, object: ObjectHandle) -> Result<(), BehaviorError> {
        self.resolve_behavior_at(object, 0)
    }

    fn resolve_behavior_at(
        &mut self,
        object: ObjectHandle,
        depth: usize,
    ) -> Result<(), BehaviorError> {
        let Some(use_id) = self.store.require(object)?.behavior else {
            return Ok(());
        };
        let Some(record_id) = self.behaviors.get_parent(use_id) else {
            return Ok(());
        };
        let Some(record) = self.behaviors.record(record_id) else {
            return Ok(());
        };
        if record.is_blocked() {
            return Ok(());
        }

        let limit = self.behaviors.options().max_inherit_depth;
        if depth >= limit {
            return Err(BehaviorError::InheritanceTooDeep { limit });
        }

        let target = self
            .store
            .find_stack(record.object_stack().as_str())
            .and_then(|stack| self.store.find_control(stack, record.object_id()))
            .filter(|target| {
                self.store
                    .get(*target)
                    .is_some_and(|o| o.kind.can_be_behavior())
            });

        match target {
            Some(target) => {
                self.behaviors.resolve(record_id, target, &mut self.store)?;
                self.resolve_behavior_at(target, depth + 1)?;
                self.behaviors.inherit(use_id, &mut self.store)
            }
            None => {
                tracing::trace!(
                    object = %self.store.long_id(object),
                    "behavior reference blocked"
                );
                self.behaviors.block(record_id)
            }
        }
    }

    /// The stack-load pass: resolve every behavior reference in the world.
    pub fn resolve_all(&mut self) -> Result<(), BehaviorError> {
        let handles: Vec<ObjectHandle> = self.store.handles().collect();
        for handle in handles {
            self.resolve_behavior(handle)?;
        }
        Ok(())
    }

    /// Deletes `object` and everything it owns.
    pub fn delete_object(&mut self, object: ObjectHandle) -> Result<(), BehaviorError> {
        let kind = self.store.require(object)?.kind;
        for child in self.store.children(object) {
            self.delete_object(child)?;
        }
        if kind == ObjectKind::Stack {
            self.behaviors.flush_stack(object, &self.store);
        }
        self.behaviors.flush_object(object);

        if let Some(removed) = self.store.remove(object) {
            if let Some(use_id) = removed.behavior {
                self.behaviors.release(use_id, &mut self.store)?;
            }
        }
        Ok(())
    }

    /// Renaming a stack invalidates every binding on it; identities that
    /// named the old stack stay unresolved until the next resolution pass.
    pub fn rename_stack(
        &mut self,
        stack: ObjectHandle,
        name: impl Into<String>,
    ) -> Result<(), BehaviorError> {
        if self.store.require(stack)?.kind != ObjectKind::Stack {
            return Err(BehaviorError::ObjectNotFound(stack));
        }
        self.behaviors.flush_stack(stack, &self.store);
        let target = self.store.require_mut(stack)?;
        target.name = name.into();
        target.has_behaviors = false;
        Ok(())
    }

    /// Re-owns an object. Its identity key named the old slot, so whatever
    /// record was bound to it lets go; when the move crosses stacks the same
    /// holds for everything it owns.
    ///
    /// A stack may only become a substack of a mainstack, and nothing may
    /// end up inside itself.
    pub fn move_object(
        &mut self,
        object: ObjectHandle,
        new_owner: ObjectHandle,
    ) -> Result<(), BehaviorError> {
        let kind = self.store.require(object)?.kind;
        let owner_kind = self.store.require(new_owner)?.kind;
        let invalid = BehaviorError::InvalidOwner {
            object,
            owner: new_owner,
        };
        if self.store.owns(object, new_owner) {
            return Err(invalid);
        }
        if kind == ObjectKind::Stack {
            let has_substacks = self.store.children(object).into_iter().any(|child| {
                self.store
                    .get(child)
                    .is_some_and(|o| o.kind == ObjectKind::Stack)
            });
            if owner_kind != ObjectKind::Stack
                || !self.store.is_mainstack(new_owner)
                || has_substacks
            {
                return Err(invalid);
            }
        }

        let from_stack = self.store.owning_stack(object);
        let to_stack = self.store.owning_stack(new_owner);
        let crosses = kind != ObjectKind::Stack && from_stack != to_stack;
        let moved = if crosses {
            self.store.subtree(object)
        } else {
            vec![object]
        };

        if crosses {
            let destination = to_stack.ok_or(BehaviorError::ObjectNotFound(new_owner))?;
            for &handle in &moved {
                let id = self.store.require(handle)?.id;
                if self.store.find_control(destination, id).is_some() {
                    return Err(BehaviorError::DuplicateObject {
                        id,
                        stack: self.store.require(destination)?.name.clone(),
                    });
                }
            }
        }

        for &handle in &moved {
            if self.behaviors.lookup(handle).is_some() {
                self.behaviors.flush_object(handle);
                self.store.set_is_behavior(handle, false);
            }
        }
        self.store.require_mut(object)?.owner = Some(new_owner);
        Ok(())
    }

    /// Long ids of every object using `object` as its behavior.
    pub fn behavior_uses(&self, object: ObjectHandle) -> Result<Vec<String>, BehaviorError> {
        match self.behaviors.lookup(object) {
            Some(record) => self.behaviors.copy_uses(record, &self.store),
            None => Ok(Vec::new()),
        }
    }

    /// Resolved behavior objects above `object`, nearest first.
    pub fn behavior_chain(&self, object: ObjectHandle) -> Vec<ObjectHandle> {
        let first = self.store.get(object).and_then(|o| o.behavior);
        self.behaviors.chain(first).map(|link| link.object).collect()
    }

    /// `object`'s own instance of a behavior variable, by name, found on the
    /// nearest link of its chain declaring it.
    pub fn behavior_variable(
        &mut self,
        object: ObjectHandle,
        name: &str,
    ) -> Result<Option<VariableRef>, BehaviorError> {
        let first = self.store.require(object)?.behavior;
        let links: Vec<_> = self.behaviors.chain(first).collect();
        for link in links {
            let slot = self
                .store
                .get(link.object)
                .and_then(|o| o.script.variable_slot(name));
            if let Some(slot) = slot {
                return self
                    .behaviors
                    .get_variable(link.use_id, slot, &self.store)
                    .map(Some);
            }
        }
        Ok(None)
    }

    fn check_cycle(
        &self,
        object: ObjectHandle,
        target: ObjectHandle,
    ) -> Result<(), BehaviorError> {
        let mut cursor = Some(target);
        while let Some(current) = cursor {
            if current == object {
                return Err(BehaviorError::CyclicBehavior { object, target });
            }
            cursor = self
                .store
                .get(current)
                .and_then(|o| o.behavior)
                .and_then(|use_id| self.behaviors.parent_object(use_id));
        }
        Ok(())
    }
}
