pub mod error;
pub mod hash;
pub mod types;
pub mod value;

pub use error::BehaviorError;
pub use types::*;
pub use value::*;
