use bh_core::{BehaviorError, IdentityKey, ObjectHandle, StackName};

use crate::record::BehaviorRecord;
use crate::usage::BehaviorUse;
use crate::{BehaviorRegistry, RecordId, UseId};

/// Walks one bucket's hash chain.
pub(crate) struct ChainIter<'a> {
    registry: &'a BehaviorRegistry,
    cursor: Option<RecordId>,
}

impl Iterator for ChainIter<'_> {
    type Item = RecordId;

    fn next(&mut self) -> Option<RecordId> {
        let current = self.cursor?;
        self.cursor = self.registry.records.get(current).and_then(|r| r.chain);
        Some(current)
    }
}

impl BehaviorRegistry {
    /// Returns a new use of the record for `(object_id, stack_name)`,
    /// creating and linking the record if this is its first use.
    ///
    /// On failure nothing allocated by this call stays reachable.
    pub fn acquire(
        &mut self,
        referrer: ObjectHandle,
        object_id: u32,
        stack_name: impl Into<StackName>,
    ) -> Result<UseId, BehaviorError> {
        let key = IdentityKey::new(object_id, stack_name);
        let hash = key.hash_value();

        let (record_id, created) = match self.find(hash, &key) {
            Some(record_id) => (record_id, false),
            None => {
                let record_id = self
                    .records
                    .try_insert(BehaviorRecord::new(key, hash))?;
                (record_id, true)
            }
        };

        let reserved = self.record_mut(record_id).and_then(|r| r.reserve_use_slot());
        let use_id = match reserved.and_then(|()| {
            self.uses
                .try_insert(BehaviorUse::new(record_id, referrer))
        }) {
            Ok(use_id) => use_id,
            Err(error) => {
                if created {
                    self.records.remove(record_id);
                }
                return Err(error);
            }
        };

        if created {
            self.link(record_id, hash);
            tracing::debug!(
                record = %record_id,
                occupancy = self.occupancy,
                "behavior record created"
            );
        }
        self.attach(record_id, use_id);
        Ok(use_id)
    }

    /// Finds the record bound to `object` by scanning every bucket.
    pub fn lookup(&self, object: ObjectHandle) -> Option<RecordId> {
        (0..self.buckets.len())
            .flat_map(|index| self.bucket_chain(index))
            .find(|id| {
                self.records
                    .get(*id)
                    .is_some_and(|record| record.object == Some(object))
            })
    }

    /// Finds the record for an identity key, if one is live.
    pub fn find_key(&self, key: &IdentityKey) -> Option<RecordId> {
        self.find(key.hash_value(), key)
    }

    pub(crate) fn find(&self, hash: u32, key: &IdentityKey) -> Option<RecordId> {
        self.bucket_chain(self.bucket_index(hash)).find(|id| {
            self.records.get(*id).is_some_and(|record| {
                record.hash == hash
                    && record.key.object_id == key.object_id
                    && record.key.stack_name == key.stack_name
            })
        })
    }

    pub(crate) fn bucket_chain(&self, index: usize) -> ChainIter<'_> {
        ChainIter {
            registry: self,
            cursor: self.buckets.get(index).copied().flatten(),
        }
    }

    /// Every record currently linked into the table, bucket by bucket.
    pub fn record_ids(&self) -> Vec<RecordId> {
        (0..self.buckets.len())
            .flat_map(|index| self.bucket_chain(index))
            .collect()
    }

    fn bucket_index(&self, hash: u32) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }

    fn link(&mut self, record_id: RecordId, hash: u32) {
        if self.occupancy == self.buckets.len() {
            self.grow();
        }

        let index = self.bucket_index(hash);
        let head = self.buckets[index];
        if let Some(record) = self.records.get_mut(record_id) {
            record.chain = head;
        }
        self.buckets[index] = Some(record_id);
        self.occupancy += 1;
    }

    /// Unlinks a record from its bucket chain and shrinks the table once
    /// occupancy drops below 5/16 of capacity.
    pub(crate) fn remove_from_table(&mut self, record_id: RecordId) {
        let Some((hash, next)) = self.records.get(record_id).map(|r| (r.hash, r.chain)) else {
            return;
        };
        let index = self.bucket_index(hash);

        if self.buckets[index] == Some(record_id) {
            self.buckets[index] = next;
        } else {
            let mut cursor = self.buckets[index];
            while let Some(current) = cursor {
                let Some(link) = self.records.get_mut(current) else {
                    break;
                };
                if link.chain == Some(record_id) {
                    link.chain = next;
                    break;
                }
                cursor = link.chain;
            }
        }

        if let Some(record) = self.records.get_mut(record_id) {
            record.chain = None;
        }
        self.occupancy -= 1;

        let capacity = self.buckets.len();
        if capacity > self.options.min_capacity && self.occupancy * 16 < capacity * 5 {
            self.shrink();
        }
    }

    /// Doubles the bucket array. If the allocation fails the table keeps its
    /// current size and chains simply get longer.
    pub(crate) fn grow(&mut self) {
        let old_capacity = self.buckets.len();
        let new_capacity = old_capacity * 2;
        if self.buckets.try_reserve_exact(old_capacity).is_err() {
            tracing::warn!(capacity = old_capacity, "behavior table could not grow");
            return;
        }
        self.buckets.resize(new_capacity, None);
        self.relocate(0, old_capacity, new_capacity);
        tracing::debug!(from = old_capacity, to = new_capacity, "behavior table grew");
    }

    pub(crate) fn shrink(&mut self) {
        let old_capacity = self.buckets.len();
        let new_capacity = old_capacity / 2;
        self.relocate(new_capacity, old_capacity, new_capacity);
        self.buckets.truncate(new_capacity);
        self.buckets.shrink_to_fit();
        tracing::debug!(from = old_capacity, to = new_capacity, "behavior table shrank");
    }

    /// Moves every record in buckets `start..finish` whose index under
    /// `new_capacity` differs. A moved record always lands outside the
    /// scanned range, so nothing is visited twice.
    fn relocate(&mut self, start: usize, finish: usize, new_capacity: usize) {
        let mask = new_capacity - 1;
        for old_index in start..finish {
            let mut previous: Option<RecordId> = None;
            let mut cursor = self.buckets[old_index];

            while let Some(current) = cursor {
                let Some((hash, next)) = self.records.get(current).map(|r| (r.hash, r.chain))
                else {
                    break;
                };
                let new_index = hash as usize & mask;

                if new_index != old_index {
                    match previous.and_then(|p| self.records.get_mut(p)) {
                        Some(prev) => prev.chain = next,
                        None => self.buckets[old_index] = next,
                    }
                    let head = self.buckets[new_index];
                    if let Some(record) = self.records.get_mut(current) {
                        record.chain = head;
                    }
                    self.buckets[new_index] = Some(current);
                } else {
                    previous = Some(current);
                }

                cursor = next;
            }
        }
    }
}
