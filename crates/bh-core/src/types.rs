use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hash::{finish, mix_bytes};

/// Generational handle to an object owned by the host object model.
///
/// The engine only ever compares and stores these; it never owns the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub index: u32,
    pub generation: u32,
}

impl ObjectHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Stack name compared without regard to case.
///
/// The folded form and its hash are computed once, so a name used inside an
/// identity key can never change underneath the table.
#[derive(Clone)]
pub struct StackName {
    display: String,
    folded: String,
    search_key: u32,
}

impl StackName {
    pub fn new(name: impl Into<String>) -> Self {
        let display = name.into();
        let folded = display.to_lowercase();
        let search_key = finish(mix_bytes(0, folded.as_bytes()));
        Self {
            display,
            folded,
            search_key,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn folded(&self) -> &str {
        &self.folded
    }

    pub fn search_key(&self) -> u32 {
        self.search_key
    }

    pub fn eq_caseless(&self, other: &str) -> bool {
        self.folded == other.to_lowercase()
    }
}

impl PartialEq for StackName {
    fn eq(&self, other: &Self) -> bool {
        self.search_key == other.search_key && self.folded == other.folded
    }
}

impl Eq for StackName {}

impl fmt::Debug for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StackName").field(&self.display).finish()
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<&str> for StackName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StackName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for StackName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

impl<'de> Deserialize<'de> for StackName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// The rugged identity of a behavior slot: object id within a named stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityKey {
    pub object_id: u32,
    pub stack_name: StackName,
}

impl IdentityKey {
    pub fn new(object_id: u32, stack_name: impl Into<StackName>) -> Self {
        Self {
            object_id,
            stack_name: stack_name.into(),
        }
    }

    pub fn hash_value(&self) -> u32 {
        let hash = mix_bytes(0, &self.object_id.to_le_bytes());
        let hash = mix_bytes(hash, &self.stack_name.search_key().to_le_bytes());
        finish(hash)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id {} of stack \"{}\"", self.object_id, self.stack_name)
    }
}
