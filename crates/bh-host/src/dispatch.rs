use bh_core::{BehaviorError, ObjectHandle};
use bh_runtime::ObjectModel;

use crate::object::ObjectKind;
use crate::script::{run_handler, HandlerOutcome};
use crate::world::World;

/// Which handlers ran for a message, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTrace {
    pub executed: Vec<ExecutedHandler>,
    pub handled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedHandler {
    /// Object whose handler ran.
    pub object: ObjectHandle,
    /// Object the message was being handled for; differs from `object` when
    /// the handler came from a behavior.
    pub context: ObjectHandle,
    pub passed: bool,
}

impl World {
    /// Sends `message` to `target`: each object on the way up the owner
    /// path tries its own script, then its behavior chain, before the
    /// message moves to its owner. Unresolved behaviors are skipped.
    pub fn send(
        &mut self,
        target: ObjectHandle,
        message: &str,
    ) -> Result<DispatchTrace, BehaviorError> {
        self.store.require(target)?;
        let mut trace = DispatchTrace::default();
        let mut cursor = Some(target);

        while let Some(current) = cursor {
            if self.handle_self(current, message, &mut trace)? == HandlerOutcome::Handled {
                trace.handled = true;
                return Ok(trace);
            }
            if self.handle_behaviors(current, message, &mut trace)? == HandlerOutcome::Handled {
                trace.handled = true;
                return Ok(trace);
            }
            cursor = self.store.get(current).and_then(|o| o.owner);
        }
        Ok(trace)
    }

    fn handle_self(
        &self,
        object: ObjectHandle,
        message: &str,
        trace: &mut DispatchTrace,
    ) -> Result<HandlerOutcome, BehaviorError> {
        let current = self.store.require(object)?;
        let Some(handler) = current.script.find_handler(message) else {
            return Ok(HandlerOutcome::Passed);
        };
        let locals = current.locals();
        let outcome = run_handler(handler, |slot| {
            locals.get(slot).cloned().ok_or(BehaviorError::VariableIndex {
                index: slot,
                count: locals.len(),
            })
        })?;
        trace.executed.push(ExecutedHandler {
            object,
            context: object,
            passed: outcome == HandlerOutcome::Passed,
        });
        Ok(outcome)
    }

    fn handle_behaviors(
        &mut self,
        object: ObjectHandle,
        message: &str,
        trace: &mut DispatchTrace,
    ) -> Result<HandlerOutcome, BehaviorError> {
        let first = self.store.require(object)?.behavior;
        let links: Vec<_> = self.behaviors.chain(first).collect();

        for link in links {
            let Some(handler) = self
                .store
                .get(link.object)
                .and_then(|o| o.script.find_handler(message))
                .filter(|handler| !handler.private)
                .cloned()
            else {
                continue;
            };

            let outcome = run_handler(&handler, |slot| {
                self.behaviors.get_variable(link.use_id, slot, &self.store)
            })?;
            trace.executed.push(ExecutedHandler {
                object: link.object,
                context: object,
                passed: outcome == HandlerOutcome::Passed,
            });
            if outcome == HandlerOutcome::Handled {
                return Ok(outcome);
            }
        }
        Ok(HandlerOutcome::Passed)
    }

    /// Whether any behavior is bound on `object`'s stack or its mainstack.
    pub fn stack_has_behaviors(&self, object: ObjectHandle) -> bool {
        let Some(stack) = self.store.owning_stack(object) else {
            return false;
        };
        self.store.has_behaviors(stack)
            || self
                .store
                .get(stack)
                .filter(|o| o.kind == ObjectKind::Stack)
                .and_then(|o| o.owner)
                .is_some_and(|mainstack| self.store.has_behaviors(mainstack))
    }
}
