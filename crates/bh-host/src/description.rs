use bh_core::{BehaviorError, ObjectHandle};
use bh_runtime::RegistryOptions;
use serde::{Deserialize, Serialize};

use crate::object::ObjectKind;
use crate::script::Script;
use crate::world::World;

/// A saved behavior reference: the identity of the target, not the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorRef {
    #[serde(default)]
    pub id: u32,
    pub stack: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDescription {
    #[serde(default)]
    pub stacks: Vec<StackDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDescription {
    pub name: String,
    #[serde(default)]
    pub script: Script,
    #[serde(default)]
    pub behavior: Option<BehaviorRef>,
    #[serde(default)]
    pub cards: Vec<CardDescription>,
    #[serde(default)]
    pub substacks: Vec<StackDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDescription {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub script: Script,
    #[serde(default)]
    pub behavior: Option<BehaviorRef>,
    #[serde(default)]
    pub controls: Vec<ControlDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDescription {
    pub id: u32,
    pub kind: ObjectKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub script: Script,
    #[serde(default)]
    pub behavior: Option<BehaviorRef>,
}

impl World {
    /// Builds a world the way a stack loader would: create every object,
    /// record each behavior reference by identity, then run one resolution
    /// pass once everything is present.
    pub fn load(
        description: &WorldDescription,
        options: RegistryOptions,
    ) -> Result<Self, BehaviorError> {
        let mut world = World::new(options)?;
        for stack in &description.stacks {
            world.load_stack(stack, None)?;
        }
        world.resolve_all()?;
        Ok(world)
    }

    fn load_stack(
        &mut self,
        description: &StackDescription,
        mainstack: Option<ObjectHandle>,
    ) -> Result<(), BehaviorError> {
        let stack = self.create_stack(description.name.clone(), mainstack)?;
        self.load_common(stack, &description.script, description.behavior.as_ref())?;

        for card in &description.cards {
            let card_handle =
                self.create_object(stack, ObjectKind::Card, card.id, card.name.clone())?;
            self.load_common(card_handle, &card.script, card.behavior.as_ref())?;
            for control in &card.controls {
                let handle = self.create_object(
                    card_handle,
                    control.kind,
                    control.id,
                    control.name.clone(),
                )?;
                self.load_common(handle, &control.script, control.behavior.as_ref())?;
            }
        }

        for substack in &description.substacks {
            self.load_stack(substack, Some(stack))?;
        }
        Ok(())
    }

    fn load_common(
        &mut self,
        object: ObjectHandle,
        script: &Script,
        behavior: Option<&BehaviorRef>,
    ) -> Result<(), BehaviorError> {
        self.set_script(object, script.clone())?;
        if let Some(reference) = behavior {
            self.set_behavior_reference(object, reference.id, &reference.stack)?;
        }
        Ok(())
    }
}
