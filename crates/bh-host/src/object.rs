use bh_core::{BehaviorError, ObjectHandle, Variable, VariableDecl, VariableRef};
use bh_runtime::{ObjectModel, UseId};
use serde::{Deserialize, Serialize};

use crate::script::Script;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    Stack,
    Card,
    Button,
    Field,
}

impl ObjectKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Stack => "stack",
            Self::Card => "card",
            Self::Button => "button",
            Self::Field => "field",
        }
    }

    /// Only buttons and stacks can carry a script used as a behavior.
    pub fn can_be_behavior(self) -> bool {
        matches!(self, Self::Stack | Self::Button)
    }
}

#[derive(Debug)]
pub struct HostObject {
    pub id: u32,
    pub name: String,
    pub kind: ObjectKind,
    pub owner: Option<ObjectHandle>,
    pub script: Script,
    pub(crate) locals: Vec<VariableRef>,
    pub(crate) behavior: Option<UseId>,
    pub(crate) is_behavior: bool,
    pub(crate) has_behaviors: bool,
}

impl HostObject {
    pub(crate) fn new(
        id: u32,
        name: String,
        kind: ObjectKind,
        owner: Option<ObjectHandle>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            owner,
            script: Script::default(),
            locals: Vec::new(),
            behavior: None,
            is_behavior: false,
            has_behaviors: false,
        }
    }

    pub fn behavior(&self) -> Option<UseId> {
        self.behavior
    }

    pub fn is_behavior(&self) -> bool {
        self.is_behavior
    }

    pub fn has_behaviors(&self) -> bool {
        self.has_behaviors
    }

    pub fn locals(&self) -> &[VariableRef] {
        &self.locals
    }

    pub(crate) fn reset_locals(&mut self) {
        self.locals = self.script.variables.iter().map(Variable::from_decl).collect();
    }
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    object: Option<HostObject>,
}

/// Generational storage for every object in the world.
#[derive(Debug, Default)]
pub struct ObjectStore {
    entries: Vec<Entry>,
    free: Vec<u32>,
}

impl ObjectStore {
    pub(crate) fn insert(&mut self, object: HostObject) -> ObjectHandle {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.object = Some(object);
            return ObjectHandle::new(index, entry.generation);
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            object: Some(object),
        });
        ObjectHandle::new(index, 0)
    }

    pub(crate) fn remove(&mut self, handle: ObjectHandle) -> Option<HostObject> {
        let entry = self.entries.get_mut(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let object = entry.object.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(object)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&HostObject> {
        let entry = self.entries.get(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.object.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut HostObject> {
        let entry = self.entries.get_mut(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.object.as_mut()
    }

    pub(crate) fn require(&self, handle: ObjectHandle) -> Result<&HostObject, BehaviorError> {
        self.get(handle).ok_or(BehaviorError::ObjectNotFound(handle))
    }

    pub(crate) fn require_mut(
        &mut self,
        handle: ObjectHandle,
    ) -> Result<&mut HostObject, BehaviorError> {
        self.get_mut(handle).ok_or(BehaviorError::ObjectNotFound(handle))
    }

    pub fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry
                .object
                .as_ref()
                .map(|_| ObjectHandle::new(index as u32, entry.generation))
        })
    }

    pub fn stacks(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.handles()
            .filter(|handle| self.get(*handle).is_some_and(|o| o.kind == ObjectKind::Stack))
    }

    /// Stack lookup by name, ignoring case.
    pub fn find_stack(&self, name: &str) -> Option<ObjectHandle> {
        let folded = name.to_lowercase();
        self.stacks().find(|handle| {
            self.get(*handle)
                .is_some_and(|o| o.name.to_lowercase() == folded)
        })
    }

    /// Control with `id` on `stack`; id 0 names the stack itself.
    pub fn find_control(&self, stack: ObjectHandle, id: u32) -> Option<ObjectHandle> {
        if id == 0 {
            return self.get(stack).map(|_| stack);
        }
        self.handles().find(|handle| {
            *handle != stack
                && self.get(*handle).is_some_and(|o| {
                    o.id == id && o.kind != ObjectKind::Stack
                })
                && self.owning_stack(*handle) == Some(stack)
        })
    }

    /// Objects whose owner is `owner`, directly.
    pub fn children(&self, owner: ObjectHandle) -> Vec<ObjectHandle> {
        self.handles()
            .filter(|handle| self.get(*handle).is_some_and(|o| o.owner == Some(owner)))
            .collect()
    }

    /// `object` followed by everything it owns, depth first.
    pub fn subtree(&self, object: ObjectHandle) -> Vec<ObjectHandle> {
        let mut pending = vec![object];
        let mut found = Vec::new();
        while let Some(current) = pending.pop() {
            found.push(current);
            pending.extend(self.children(current));
        }
        found
    }

    /// Whether `ancestor` appears on `object`'s owner path, `object` included.
    pub fn owns(&self, ancestor: ObjectHandle, object: ObjectHandle) -> bool {
        let mut cursor = Some(object);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.get(current).and_then(|o| o.owner);
        }
        false
    }

    /// Identity id for an object used as a behavior; stacks always use 0.
    pub fn behavior_id(&self, object: ObjectHandle) -> Option<u32> {
        let object = self.get(object)?;
        Some(if object.kind == ObjectKind::Stack {
            0
        } else {
            object.id
        })
    }
}

impl ObjectModel for ObjectStore {
    fn owning_stack(&self, object: ObjectHandle) -> Option<ObjectHandle> {
        let mut cursor = object;
        loop {
            let current = self.get(cursor)?;
            if current.kind == ObjectKind::Stack {
                return Some(cursor);
            }
            cursor = current.owner?;
        }
    }

    fn is_mainstack(&self, stack: ObjectHandle) -> bool {
        self.get(stack)
            .is_some_and(|o| o.kind == ObjectKind::Stack && o.owner.is_none())
    }

    fn mainstack_of(&self, stack: ObjectHandle) -> Option<ObjectHandle> {
        let object = self.get(stack)?;
        match object.owner {
            Some(owner) => Some(owner),
            None => Some(stack),
        }
    }

    fn has_behaviors(&self, stack: ObjectHandle) -> bool {
        self.get(stack).is_some_and(|o| o.has_behaviors)
    }

    fn set_has_behaviors(&mut self, stack: ObjectHandle, value: bool) {
        if let Some(object) = self.get_mut(stack) {
            object.has_behaviors = value;
        }
    }

    fn is_behavior(&self, object: ObjectHandle) -> bool {
        self.get(object).is_some_and(|o| o.is_behavior)
    }

    fn set_is_behavior(&mut self, object: ObjectHandle, value: bool) {
        if let Some(object) = self.get_mut(object) {
            object.is_behavior = value;
        }
    }

    fn declared_behavior(&self, object: ObjectHandle) -> Option<UseId> {
        self.get(object).and_then(|o| o.behavior)
    }

    fn script_variables(&self, object: ObjectHandle) -> &[VariableDecl] {
        self.get(object)
            .map_or(&[][..], |o| o.script.variables.as_slice())
    }

    fn long_id(&self, object: ObjectHandle) -> String {
        let Some(current) = self.get(object) else {
            return String::new();
        };
        if current.kind == ObjectKind::Stack {
            return match current.owner.and_then(|owner| self.get(owner)) {
                Some(mainstack) => {
                    format!("stack \"{}\" of stack \"{}\"", current.name, mainstack.name)
                }
                None => format!("stack \"{}\"", current.name),
            };
        }
        let owner = current
            .owner
            .map(|owner| self.long_id(owner))
            .unwrap_or_default();
        format!("{} id {} of {}", current.kind.name(), current.id, owner)
    }
}
