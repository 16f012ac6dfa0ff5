//! A reference object model for the behavior engine: stacks, cards and
//! controls with scripts, plus the host-side duties the registry relies on.

mod description;
mod dispatch;
mod object;
mod script;
mod world;

pub use description::{
    BehaviorRef, CardDescription, ControlDescription, StackDescription, WorldDescription,
};
pub use dispatch::{DispatchTrace, ExecutedHandler};
pub use object::{HostObject, ObjectKind, ObjectStore};
pub use script::{Handler, HandlerOutcome, Script, Step};
pub use world::World;
