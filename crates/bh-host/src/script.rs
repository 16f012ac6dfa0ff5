use bh_core::{BehaviorError, Value, VariableDecl, VariableRef};
use serde::{Deserialize, Serialize};

/// A compiled object script: handlers plus script-local variables in slot
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    #[serde(default)]
    pub handlers: Vec<Handler>,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
}

impl Script {
    pub fn find_handler(&self, message: &str) -> Option<&Handler> {
        self.handlers
            .iter()
            .find(|handler| handler.name.eq_ignore_ascii_case(message))
    }

    pub fn variable_slot(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|decl| decl.name == name)
    }

    /// Where each of this script's slots lands in `next`, matched by name.
    pub fn remap_to(&self, next: &Script) -> Vec<Option<usize>> {
        self.variables
            .iter()
            .map(|decl| next.variable_slot(&decl.name))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handler {
    pub name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Handler {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            private: false,
            steps,
        }
    }
}

/// Handler body. Just enough to observe which handler ran and which
/// variable storage it saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    Set { slot: usize, value: Value },
    Add { slot: usize, amount: f64 },
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Handled,
    Passed,
}

/// Runs `handler`, resolving each slot through `variable`.
pub(crate) fn run_handler<F>(
    handler: &Handler,
    mut variable: F,
) -> Result<HandlerOutcome, BehaviorError>
where
    F: FnMut(usize) -> Result<VariableRef, BehaviorError>,
{
    for step in &handler.steps {
        match step {
            Step::Set { slot, value } => {
                variable(*slot)?.borrow_mut().value = value.clone();
            }
            Step::Add { slot, amount } => {
                let target = variable(*slot)?;
                let mut target = target.borrow_mut();
                let current = target.value.as_number().unwrap_or(0.0);
                target.value = Value::Number(current + amount);
            }
            Step::Pass => return Ok(HandlerOutcome::Passed),
        }
    }
    Ok(HandlerOutcome::Handled)
}
