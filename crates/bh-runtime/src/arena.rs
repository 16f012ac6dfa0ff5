use bh_core::BehaviorError;

/// Slot index plus the generation it was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub index: u32,
    pub generation: u32,
}

pub(crate) trait ArenaKey: Copy {
    fn from_slot(slot: SlotKey) -> Self;
    fn slot(self) -> SlotKey;
}

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(SlotKey);

        impl $name {
            pub fn index(self) -> u32 {
                self.0.index
            }

            pub fn generation(self) -> u32 {
                self.0.generation
            }
        }

        impl ArenaKey for $name {
            fn from_slot(slot: SlotKey) -> Self {
                Self(slot)
            }

            fn slot(self) -> SlotKey {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "#{}v{}", self.0.index, self.0.generation)
            }
        }
    };
}

arena_key!(
    /// Handle to a shared behavior record.
    RecordId
);
arena_key!(
    /// Handle to one referrer's use of a behavior record.
    UseId
);

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub(crate) struct Arena<K, T> {
    what: &'static str,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    limit: Option<usize>,
    _key: std::marker::PhantomData<K>,
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub(crate) fn new(what: &'static str, limit: Option<usize>) -> Self {
        Self {
            what,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            limit,
            _key: std::marker::PhantomData,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn try_insert(&mut self, value: T) -> Result<K, BehaviorError> {
        if self.limit.is_some_and(|limit| self.live >= limit) {
            return Err(BehaviorError::alloc(self.what));
        }

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.live += 1;
            return Ok(K::from_slot(SlotKey {
                index,
                generation: slot.generation,
            }));
        }

        let index =
            u32::try_from(self.slots.len()).map_err(|_| BehaviorError::alloc(self.what))?;
        self.slots
            .try_reserve(1)
            .map_err(|_| BehaviorError::alloc(self.what))?;
        // The free list must be able to take every slot back without growing.
        let needed = self.slots.len() + 1;
        if self.free.capacity() < needed {
            self.free
                .try_reserve(needed - self.free.len())
                .map_err(|_| BehaviorError::alloc(self.what))?;
        }
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.live += 1;
        Ok(K::from_slot(SlotKey {
            index,
            generation: 0,
        }))
    }

    pub(crate) fn remove(&mut self, key: K) -> Option<T> {
        let slot_key = key.slot();
        let slot = self.slots.get_mut(slot_key.index as usize)?;
        if slot.generation != slot_key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(slot_key.index);
        self.live -= 1;
        Some(value)
    }

    pub(crate) fn get(&self, key: K) -> Option<&T> {
        let slot_key = key.slot();
        let slot = self.slots.get(slot_key.index as usize)?;
        if slot.generation != slot_key.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub(crate) fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let slot_key = key.slot();
        let slot = self.slots.get_mut(slot_key.index as usize)?;
        if slot.generation != slot_key.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}
