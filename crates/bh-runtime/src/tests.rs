use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use bh_core::{BehaviorError, IdentityKey, ObjectHandle, Value, VariableDecl};
use proptest::prelude::*;

use super::*;

#[derive(Debug, Default)]
struct MockObject {
    stack: Option<ObjectHandle>,
    is_behavior: bool,
    declared: Option<UseId>,
    vars: Vec<VariableDecl>,
}

#[derive(Debug, Default)]
struct MockModel {
    objects: HashMap<ObjectHandle, MockObject>,
    flagged_stacks: HashSet<ObjectHandle>,
    mainstack_of: HashMap<ObjectHandle, ObjectHandle>,
}

impl MockModel {
    fn add(&mut self, object: ObjectHandle, stack: ObjectHandle, vars: Vec<VariableDecl>) {
        self.objects.insert(
            object,
            MockObject {
                stack: Some(stack),
                vars,
                ..MockObject::default()
            },
        );
    }

    fn declare(&mut self, object: ObjectHandle, use_id: UseId) {
        self.objects.entry(object).or_default().declared = Some(use_id);
    }
}

impl ObjectModel for MockModel {
    fn owning_stack(&self, object: ObjectHandle) -> Option<ObjectHandle> {
        self.objects.get(&object).and_then(|o| o.stack)
    }

    fn is_mainstack(&self, stack: ObjectHandle) -> bool {
        !self.mainstack_of.contains_key(&stack)
    }

    fn mainstack_of(&self, stack: ObjectHandle) -> Option<ObjectHandle> {
        self.mainstack_of.get(&stack).copied()
    }

    fn has_behaviors(&self, stack: ObjectHandle) -> bool {
        self.flagged_stacks.contains(&stack)
    }

    fn set_has_behaviors(&mut self, stack: ObjectHandle, value: bool) {
        if value {
            self.flagged_stacks.insert(stack);
        } else {
            self.flagged_stacks.remove(&stack);
        }
    }

    fn is_behavior(&self, object: ObjectHandle) -> bool {
        self.objects.get(&object).is_some_and(|o| o.is_behavior)
    }

    fn set_is_behavior(&mut self, object: ObjectHandle, value: bool) {
        self.objects.entry(object).or_default().is_behavior = value;
    }

    fn declared_behavior(&self, object: ObjectHandle) -> Option<UseId> {
        self.objects.get(&object).and_then(|o| o.declared)
    }

    fn script_variables(&self, object: ObjectHandle) -> &[VariableDecl] {
        self.objects
            .get(&object)
            .map_or(&[][..], |o| o.vars.as_slice())
    }

    fn long_id(&self, object: ObjectHandle) -> String {
        format!("object {}", object.index)
    }
}

fn obj(index: u32) -> ObjectHandle {
    ObjectHandle::new(index, 0)
}

const STACK: ObjectHandle = ObjectHandle::new(900, 0);

fn counter_vars() -> Vec<VariableDecl> {
    vec![
        VariableDecl::with_initializer("count", Value::Number(0.0)),
        VariableDecl::new("label"),
    ]
}

fn assert_consistent(registry: &BehaviorRegistry) {
    let linked = registry.record_ids();
    assert_eq!(linked.len(), registry.occupancy());
    assert_eq!(registry.records.len(), registry.occupancy());
    assert!(registry.capacity().is_power_of_two());
    assert!(registry.capacity() >= registry.options.min_capacity);

    let unique: HashSet<RecordId> = linked.iter().copied().collect();
    assert_eq!(unique.len(), linked.len(), "record linked twice");

    for record_id in linked {
        let record = registry.record(record_id).expect("linked record is live");
        assert!(record.use_count() > 0, "record {record_id} has no uses");
        assert_eq!(registry.find_key(record.key()), Some(record_id));
        for use_id in record.uses() {
            assert_eq!(registry.get_parent(use_id), Some(record_id));
        }
    }
}

#[test]
fn new_rejects_capacity_that_is_not_a_power_of_two() {
    let error = BehaviorRegistry::new(RegistryOptions {
        min_capacity: 1000,
        ..RegistryOptions::default()
    })
    .err()
    .expect("bad capacity should fail");
    assert_eq!(error.code(), "BEHAVIOR_OPTIONS");

    let registry = BehaviorRegistry::new(RegistryOptions::default()).expect("defaults");
    assert_eq!(registry.capacity(), DEFAULT_MIN_CAPACITY);
    assert!(registry.is_empty());
}

#[test]
fn acquire_shares_one_record_per_caseless_key() {
    let mut registry = BehaviorRegistry::default();
    let a = registry.acquire(obj(1), 5, "Home").expect("acquire a");
    let b = registry.acquire(obj(2), 5, "HOME").expect("acquire b");
    let other = registry.acquire(obj(3), 6, "Home").expect("acquire other");

    assert_eq!(registry.get_parent(a), registry.get_parent(b));
    assert_ne!(registry.get_parent(a), registry.get_parent(other));
    assert_eq!(registry.occupancy(), 2);

    let record = registry
        .record(registry.get_parent(a).expect("parent"))
        .expect("record");
    assert_eq!(record.object_id(), 5);
    assert_eq!(record.object_stack().as_str(), "Home");
    assert_eq!(record.uses().collect::<Vec<_>>(), vec![b, a]);
    assert_consistent(&registry);
}

#[test]
fn releasing_every_use_destroys_the_record() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, Vec::new());
    let mut registry = BehaviorRegistry::default();

    let a = registry.acquire(obj(1), 5, "Home").expect("acquire a");
    let b = registry.acquire(obj(2), 5, "Home").expect("acquire b");
    let record = registry.get_parent(a).expect("parent");
    registry.resolve(record, obj(10), &mut model).expect("resolve");
    assert_eq!(registry.lookup(obj(10)), Some(record));
    assert!(model.is_behavior(obj(10)));

    registry.release(a, &mut model).expect("release a");
    assert_eq!(registry.lookup(obj(10)), Some(record));
    registry.release(b, &mut model).expect("release b");

    assert_eq!(registry.lookup(obj(10)), None);
    assert!(registry.record(record).is_none());
    assert!(registry.is_empty());
    assert!(!model.is_behavior(obj(10)));
    assert_consistent(&registry);
}

#[test]
fn release_of_a_stale_use_is_an_error() {
    let mut model = MockModel::default();
    let mut registry = BehaviorRegistry::default();
    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    registry.release(use_id, &mut model).expect("release");

    let error = registry
        .release(use_id, &mut model)
        .expect_err("second release");
    assert_eq!(error.code(), "BEHAVIOR_STALE_USE");
    assert_eq!(registry.get_parent(use_id), None);
}

#[test]
fn resolve_marks_object_stack_and_mainstack() {
    let mut model = MockModel::default();
    let substack = obj(901);
    model.mainstack_of.insert(substack, STACK);
    model.add(obj(10), substack, Vec::new());

    let mut registry = BehaviorRegistry::default();
    let use_id = registry.acquire(obj(1), 5, "Sub").expect("acquire");
    let record = registry.get_parent(use_id).expect("parent");

    registry.block(record).expect("block");
    assert!(registry.is_blocked(record));

    registry.resolve(record, obj(10), &mut model).expect("resolve");
    assert!(!registry.is_blocked(record));
    assert_eq!(registry.parent_object(use_id), Some(obj(10)));
    assert!(model.is_behavior(obj(10)));
    assert!(model.has_behaviors(substack));
    assert!(model.has_behaviors(STACK));

    // Same object again is a no-op and leaves the block untouched.
    registry.block(record).expect("block");
    registry.resolve(record, obj(10), &mut model).expect("resolve again");
    assert!(registry.is_blocked(record));
}

#[test]
fn variables_materialize_once_per_use() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, counter_vars());
    let mut registry = BehaviorRegistry::default();

    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    let record = registry.get_parent(use_id).expect("parent");

    let error = registry
        .get_variable(use_id, 0, &model)
        .expect_err("unresolved");
    assert_eq!(
        error,
        BehaviorError::Unresolved {
            key: IdentityKey::new(5, "Home")
        }
    );
    assert_eq!(registry.local_count(use_id), 0);

    registry.resolve(record, obj(10), &mut model).expect("resolve");
    let first = registry.get_variable(use_id, 0, &model).expect("slot 0");
    let again = registry.get_variable(use_id, 0, &model).expect("slot 0");
    assert!(Rc::ptr_eq(&first, &again));
    assert_eq!(first.borrow().name, "count");
    assert_eq!(first.borrow().value, Value::Number(0.0));
    assert!(registry
        .get_variable(use_id, 1, &model)
        .expect("slot 1")
        .borrow()
        .value
        .is_null());
    assert_eq!(registry.local_count(use_id), 2);

    let error = registry
        .get_variable(use_id, 2, &model)
        .expect_err("out of range");
    assert_eq!(error, BehaviorError::VariableIndex { index: 2, count: 2 });
}

#[test]
fn uses_of_one_record_have_independent_variables() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, counter_vars());
    let mut registry = BehaviorRegistry::default();

    let a = registry.acquire(obj(1), 5, "Home").expect("acquire a");
    let b = registry.acquire(obj(2), 5, "Home").expect("acquire b");
    let record = registry.get_parent(a).expect("parent");
    registry.resolve(record, obj(10), &mut model).expect("resolve");

    registry
        .get_variable(a, 0, &model)
        .expect("a slot")
        .borrow_mut()
        .value = Value::Number(7.0);
    let b_count = registry.get_variable(b, 0, &model).expect("b slot");
    assert_eq!(b_count.borrow().value, Value::Number(0.0));
}

#[test]
fn flush_object_unbinds_and_clears_variables() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, counter_vars());
    let mut registry = BehaviorRegistry::default();

    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    let record = registry.get_parent(use_id).expect("parent");
    registry.resolve(record, obj(10), &mut model).expect("resolve");
    registry.get_variable(use_id, 0, &model).expect("materialize");
    assert_eq!(registry.local_count(use_id), 2);

    registry.flush_object(obj(10));

    assert_eq!(registry.parent_object(use_id), None);
    assert_eq!(registry.local_count(use_id), 0);
    assert_eq!(registry.lookup(obj(10)), None);
    assert_eq!(registry.find_key(&IdentityKey::new(5, "home")), Some(record));
}

#[test]
fn flush_stack_only_touches_records_on_that_stack() {
    let mut model = MockModel::default();
    let other_stack = obj(902);
    model.add(obj(10), STACK, Vec::new());
    model.add(obj(11), other_stack, Vec::new());
    let mut registry = BehaviorRegistry::default();

    let on_stack = registry.acquire(obj(1), 5, "Home").expect("acquire");
    let elsewhere = registry.acquire(obj(2), 6, "Other").expect("acquire");
    let first = registry.get_parent(on_stack).expect("parent");
    let second = registry.get_parent(elsewhere).expect("parent");
    registry.resolve(first, obj(10), &mut model).expect("resolve");
    registry.resolve(second, obj(11), &mut model).expect("resolve");

    registry.flush_stack(STACK, &model);

    assert_eq!(registry.get_object(first), None);
    assert_eq!(registry.get_object(second), Some(obj(11)));
}

#[test]
fn preserve_vars_with_identity_map_keeps_values() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, counter_vars());
    let mut registry = BehaviorRegistry::default();

    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    let record = registry.get_parent(use_id).expect("parent");
    registry.resolve(record, obj(10), &mut model).expect("resolve");
    let count = registry.get_variable(use_id, 0, &model).expect("slot");
    count.borrow_mut().value = Value::Number(42.0);

    registry
        .preserve_vars(use_id, &[Some(0), Some(1)], &counter_vars())
        .expect("preserve");

    let after = registry.get_variable(use_id, 0, &model).expect("slot");
    assert!(Rc::ptr_eq(&count, &after));
    assert_eq!(after.borrow().value, Value::Number(42.0));
}

#[test]
fn preserve_vars_moves_live_variables_and_seeds_new_slots() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, counter_vars());
    let mut registry = BehaviorRegistry::default();

    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    let record = registry.get_parent(use_id).expect("parent");
    registry.resolve(record, obj(10), &mut model).expect("resolve");
    let count = registry.get_variable(use_id, 0, &model).expect("slot");
    count.borrow_mut().value = Value::Number(9.0);

    // "label" is dropped, "count" moves to slot 1, slot 0 is new.
    let layout = vec![
        VariableDecl::with_initializer("total", Value::String("none".to_string())),
        VariableDecl::with_initializer("count", Value::Number(0.0)),
    ];
    registry
        .preserve_vars_for(obj(10), &[Some(1), None], &layout)
        .expect("preserve");

    assert_eq!(registry.local_count(use_id), 2);
    let moved = registry.get_variable(use_id, 1, &model).expect("slot 1");
    assert!(Rc::ptr_eq(&count, &moved));
    assert_eq!(moved.borrow().value, Value::Number(9.0));
    let fresh = registry.get_variable(use_id, 0, &model).expect("slot 0");
    assert_eq!(fresh.borrow().name, "total");
    assert_eq!(fresh.borrow().value, Value::String("none".to_string()));
}

#[test]
fn preserve_vars_leaves_unmaterialized_uses_alone() {
    let mut registry = BehaviorRegistry::default();
    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    registry
        .preserve_vars(use_id, &[], &counter_vars())
        .expect("preserve");
    assert_eq!(registry.local_count(use_id), 0);
    assert!(!registry
        .behavior_use(use_id)
        .expect("use")
        .is_materialized());
}

#[test]
fn preserve_vars_with_empty_layout_unmaterializes() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, counter_vars());
    let mut registry = BehaviorRegistry::default();

    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    let record = registry.get_parent(use_id).expect("parent");
    registry.resolve(record, obj(10), &mut model).expect("resolve");
    registry.get_variable(use_id, 1, &model).expect("materialize");

    registry
        .preserve_vars(use_id, &[None, None], &[])
        .expect("preserve");

    assert!(!registry
        .behavior_use(use_id)
        .expect("use")
        .is_materialized());
}

#[test]
fn clear_vars_rematerializes_with_current_initializers() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, counter_vars());
    let mut registry = BehaviorRegistry::default();

    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    let record = registry.get_parent(use_id).expect("parent");
    registry.resolve(record, obj(10), &mut model).expect("resolve");
    registry.get_variable(use_id, 0, &model).expect("materialize");

    model.objects.get_mut(&obj(10)).expect("object").vars =
        vec![VariableDecl::with_initializer("count", Value::Number(5.0))];
    registry.clear_vars_for(obj(10));
    assert_eq!(registry.local_count(use_id), 0);

    let count = registry.get_variable(use_id, 0, &model).expect("slot");
    assert_eq!(count.borrow().value, Value::Number(5.0));
    assert_eq!(registry.local_count(use_id), 1);

    registry.clear_vars(use_id).expect("clear");
    assert_eq!(registry.local_count(use_id), 0);
}

/// c's object declares behavior B, whose object declares behavior A.
struct ThreeLevels {
    model: MockModel,
    registry: BehaviorRegistry,
    record_a: RecordId,
    record_b: RecordId,
    record_c: RecordId,
    referrer_use: UseId,
}

fn three_levels(options: RegistryOptions) -> ThreeLevels {
    let mut model = MockModel::default();
    let (a, b, c) = (obj(10), obj(11), obj(12));
    model.add(a, STACK, counter_vars());
    model.add(b, STACK, counter_vars());
    model.add(c, STACK, counter_vars());
    let mut registry = BehaviorRegistry::new(options).expect("registry");

    let b_uses_a = registry.acquire(b, 10, "Home").expect("b -> A");
    let c_uses_b = registry.acquire(c, 11, "Home").expect("c -> B");
    let referrer_use = registry.acquire(obj(1), 12, "Home").expect("r -> C");
    model.declare(b, b_uses_a);
    model.declare(c, c_uses_b);

    let record_a = registry.get_parent(b_uses_a).expect("A");
    let record_b = registry.get_parent(c_uses_b).expect("B");
    let record_c = registry.get_parent(referrer_use).expect("C");
    registry.resolve(record_a, a, &mut model).expect("resolve A");
    registry.resolve(record_b, b, &mut model).expect("resolve B");
    registry.resolve(record_c, c, &mut model).expect("resolve C");

    ThreeLevels {
        model,
        registry,
        record_a,
        record_b,
        record_c,
        referrer_use,
    }
}

#[test]
fn inherit_builds_a_super_chain_per_level() {
    let ThreeLevels {
        mut model,
        mut registry,
        record_a,
        record_b,
        record_c,
        referrer_use,
    } = three_levels(RegistryOptions::default());

    registry
        .inherit(referrer_use, &mut model)
        .expect("inherit");

    let first = registry.get_super(referrer_use).expect("super");
    let second = registry.get_super(first).expect("super of super");
    assert_eq!(registry.get_parent(referrer_use), Some(record_c));
    assert_eq!(registry.get_parent(first), Some(record_b));
    assert_eq!(registry.get_parent(second), Some(record_a));
    assert_eq!(registry.get_super(second), None);
    assert_eq!(registry.get_referrer(second), Some(obj(1)));

    let chain: Vec<ObjectHandle> = registry
        .chain(Some(referrer_use))
        .map(|link| link.object)
        .collect();
    assert_eq!(chain, vec![obj(12), obj(11), obj(10)]);

    // Super-uses keep their own variables.
    let own = registry.get_variable(first, 0, &model).expect("slot");
    own.borrow_mut().value = Value::Number(1.0);
    let c_declared = model.declared_behavior(obj(12)).expect("c use");
    let theirs = registry.get_variable(c_declared, 0, &model).expect("slot");
    assert_eq!(theirs.borrow().value, Value::Number(0.0));

    // Releasing the referrer releases its whole chain.
    let before = registry.use_count();
    registry.release(referrer_use, &mut model).expect("release");
    assert_eq!(registry.use_count(), before - 3);
    assert!(registry.record(record_c).is_none());
    assert_consistent(&registry);
}

#[test]
fn inherit_on_unresolved_record_leaves_no_super() {
    let mut model = MockModel::default();
    let mut registry = BehaviorRegistry::default();
    let use_id = registry.acquire(obj(1), 5, "Home").expect("acquire");
    registry.inherit(use_id, &mut model).expect("inherit");
    assert_eq!(registry.get_super(use_id), None);
    assert_eq!(registry.chain(Some(use_id)).count(), 0);
}

#[test]
fn inherit_failure_discards_the_chain_instead_of_restoring_it() {
    // Three declaring uses + two super-uses fit; one more declaration puts a
    // rebuild one use over budget.
    let ThreeLevels {
        mut model,
        mut registry,
        referrer_use,
        ..
    } = three_levels(RegistryOptions {
        use_limit: Some(6),
        ..RegistryOptions::default()
    });
    registry
        .inherit(referrer_use, &mut model)
        .expect("first inherit fits");
    assert_eq!(registry.use_count(), 5);

    let a_uses_d = registry.acquire(obj(10), 13, "Home").expect("a -> D");
    model.add(obj(13), STACK, Vec::new());
    model.declare(obj(10), a_uses_d);
    let record_d = registry.get_parent(a_uses_d).expect("D");
    registry
        .resolve(record_d, obj(13), &mut model)
        .expect("resolve D");

    let error = registry
        .inherit(referrer_use, &mut model)
        .expect_err("rebuild exceeds budget");
    assert!(error.is_alloc());
    assert_eq!(registry.get_super(referrer_use), None);
    assert_eq!(registry.use_count(), 4);
    assert_consistent(&registry);
}

#[test]
fn inherit_stops_at_depth_limit_without_leaking() {
    let mut model = MockModel::default();
    model.add(obj(10), STACK, Vec::new());
    let mut registry = BehaviorRegistry::new(RegistryOptions {
        max_inherit_depth: 4,
        ..RegistryOptions::default()
    })
    .expect("registry");

    // An object that is its own behavior: only the host's cycle check
    // normally prevents this.
    let self_use = registry.acquire(obj(10), 10, "Home").expect("self");
    model.declare(obj(10), self_use);
    let record = registry.get_parent(self_use).expect("record");
    registry.resolve(record, obj(10), &mut model).expect("resolve");

    let referrer = registry.acquire(obj(1), 10, "Home").expect("referrer");
    let error = registry
        .inherit(referrer, &mut model)
        .expect_err("cycle runs out of depth");
    assert_eq!(error, BehaviorError::InheritanceTooDeep { limit: 4 });
    assert_eq!(registry.get_super(referrer), None);
    assert_eq!(registry.use_count(), 2);
    assert_consistent(&registry);
}

#[test]
fn reinherit_refreshes_every_use_after_the_behavior_changes() {
    let ThreeLevels {
        mut model,
        mut registry,
        record_b,
        record_c,
        referrer_use,
        ..
    } = three_levels(RegistryOptions::default());
    let other = registry.acquire(obj(2), 12, "Home").expect("second referrer");
    registry.reinherit(record_c, &mut model).expect("reinherit");
    assert_eq!(registry.chain(Some(other)).count(), 3);
    assert_eq!(registry.chain(Some(referrer_use)).count(), 3);

    // c drops its behavior; both referrers' chains shorten.
    let c_uses_b = model.declared_behavior(obj(12)).expect("c use");
    model.objects.get_mut(&obj(12)).expect("c").declared = None;
    registry.release(c_uses_b, &mut model).expect("release");
    registry.reinherit(record_c, &mut model).expect("reinherit");

    assert_eq!(registry.get_super(other), None);
    assert_eq!(registry.get_super(referrer_use), None);
    assert!(registry.record(record_b).is_none());
    assert_consistent(&registry);
}

#[test]
fn clone_use_duplicates_depth_but_not_storage() {
    let ThreeLevels {
        mut model,
        mut registry,
        record_c,
        referrer_use,
        ..
    } = three_levels(RegistryOptions::default());
    registry
        .inherit(referrer_use, &mut model)
        .expect("inherit");

    let copy = registry.clone_use(referrer_use, obj(2)).expect("clone");
    assert_eq!(registry.get_parent(copy), Some(record_c));
    assert_eq!(registry.get_referrer(copy), Some(obj(2)));
    assert_eq!(registry.chain(Some(copy)).count(), 3);
    let copied_super = registry.get_super(copy).expect("super");
    assert_ne!(Some(copied_super), registry.get_super(referrer_use));
    assert_eq!(registry.get_referrer(copied_super), Some(obj(2)));

    let original = registry.get_variable(referrer_use, 0, &model).expect("slot");
    original.borrow_mut().value = Value::Number(3.0);
    let cloned = registry.get_variable(copy, 0, &model).expect("slot");
    assert_eq!(cloned.borrow().value, Value::Number(0.0));

    cloned.borrow_mut().value = Value::Number(8.0);
    assert_eq!(original.borrow().value, Value::Number(3.0));
    assert_consistent(&registry);
}

#[test]
fn copy_uses_lists_referrers_newest_first() {
    let model = MockModel::default();
    let mut registry = BehaviorRegistry::default();
    let a = registry.acquire(obj(1), 5, "Home").expect("a");
    registry.acquire(obj(2), 5, "Home").expect("b");
    let record = registry.get_parent(a).expect("record");

    let uses = registry.copy_uses(record, &model).expect("uses");
    assert_eq!(uses, vec!["object 2".to_string(), "object 1".to_string()]);
}

#[test]
fn chain_stops_at_first_unresolved_link() {
    let ThreeLevels {
        mut model,
        mut registry,
        record_b,
        referrer_use,
        ..
    } = three_levels(RegistryOptions::default());
    registry
        .inherit(referrer_use, &mut model)
        .expect("inherit");
    registry.flush(record_b).expect("flush");

    let chain: Vec<ObjectHandle> = registry
        .chain(Some(referrer_use))
        .map(|link| link.object)
        .collect();
    assert_eq!(chain, vec![obj(12)]);
    assert_eq!(registry.chain(None).count(), 0);
}

#[test]
fn failed_acquire_unwinds_the_new_record() {
    let mut registry = BehaviorRegistry::new(RegistryOptions {
        use_limit: Some(1),
        ..RegistryOptions::default()
    })
    .expect("registry");
    registry.acquire(obj(1), 5, "Home").expect("first fits");

    let error = registry
        .acquire(obj(2), 6, "Home")
        .expect_err("second use over budget");
    assert_eq!(error, BehaviorError::alloc("behavior use"));
    assert_eq!(registry.occupancy(), 1);
    assert_eq!(registry.records.len(), 1);
    assert_eq!(registry.find_key(&IdentityKey::new(6, "Home")), None);
    assert_consistent(&registry);
}

#[test]
fn record_budget_failure_leaves_existing_records() {
    let mut registry = BehaviorRegistry::new(RegistryOptions {
        record_limit: Some(1),
        ..RegistryOptions::default()
    })
    .expect("registry");
    let first = registry.acquire(obj(1), 5, "Home").expect("first");
    registry
        .acquire(obj(2), 5, "home")
        .expect("same key needs no record");
    let error = registry
        .acquire(obj(3), 6, "Home")
        .expect_err("new record over budget");
    assert_eq!(error, BehaviorError::alloc("behavior record"));
    assert_eq!(registry.use_count(), 2);
    assert_eq!(
        registry
            .record(registry.get_parent(first).expect("parent"))
            .expect("record")
            .use_count(),
        2
    );
}

#[test]
fn table_grows_and_shrinks_with_churn() {
    let mut model = MockModel::default();
    let mut registry = BehaviorRegistry::default();
    let mut uses = Vec::new();

    for id in 0..3000u32 {
        let object = obj(10_000 + id);
        model.add(object, STACK, Vec::new());
        let use_id = registry.acquire(obj(1), id, "Home").expect("acquire");
        let record = registry.get_parent(use_id).expect("record");
        registry.resolve(record, object, &mut model).expect("resolve");
        uses.push((use_id, object));
    }
    assert_eq!(registry.occupancy(), 3000);
    assert_eq!(registry.capacity(), 4096);
    assert_consistent(&registry);
    for (use_id, object) in uses.iter().step_by(97) {
        assert_eq!(registry.lookup(*object), registry.get_parent(*use_id));
    }

    let (released, kept) = uses.split_at(2800);
    for (use_id, _) in released {
        registry.release(*use_id, &mut model).expect("release");
    }
    assert_eq!(registry.occupancy(), 200);
    assert_eq!(registry.capacity(), 1024);
    assert_consistent(&registry);
    for (use_id, object) in kept {
        assert_eq!(registry.lookup(*object), registry.get_parent(*use_id));
    }

    registry.cleanup();
    assert!(registry.is_empty());
    assert_eq!(registry.use_count(), 0);
    assert_eq!(registry.get_parent(kept[0].0), None);
}

#[test]
fn small_tables_relocate_chains_on_grow() {
    let mut registry = BehaviorRegistry::new(RegistryOptions {
        min_capacity: 2,
        ..RegistryOptions::default()
    })
    .expect("registry");
    let mut model = MockModel::default();
    let uses: Vec<UseId> = (0..9u32)
        .map(|id| registry.acquire(obj(1), id, "Tiny").expect("acquire"))
        .collect();
    assert_eq!(registry.capacity(), 16);
    assert_consistent(&registry);

    for use_id in &uses[1..] {
        registry.release(*use_id, &mut model).expect("release");
        assert_consistent(&registry);
    }
    assert_eq!(registry.capacity(), 2);
    assert_eq!(registry.occupancy(), 1);
}

#[derive(Debug, Clone)]
enum Churn {
    Acquire { id: u32, stack: usize },
    Release(usize),
}

fn churn_op() -> impl Strategy<Value = Churn> {
    prop_oneof![
        3 => (0u32..600, 0usize..3).prop_map(|(id, stack)| Churn::Acquire { id, stack }),
        2 => any::<usize>().prop_map(Churn::Release),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn churn_keeps_every_live_record_findable(ops in prop::collection::vec(churn_op(), 1..400)) {
        const STACKS: [&str; 3] = ["Home", "HOME", "Library"];
        let mut registry = BehaviorRegistry::new(RegistryOptions {
            min_capacity: 16,
            ..RegistryOptions::default()
        })
        .expect("registry");
        let mut model = MockModel::default();
        let mut live: Vec<(UseId, IdentityKey)> = Vec::new();

        for op in ops {
            match op {
                Churn::Acquire { id, stack } => {
                    let use_id = registry.acquire(obj(1), id, STACKS[stack]).expect("acquire");
                    let record = registry.get_parent(use_id).expect("record");
                    let object = obj(id * 4 + u32::from(stack == 2));
                    registry.resolve(record, object, &mut model).expect("resolve");
                    live.push((use_id, IdentityKey::new(id, STACKS[stack])));
                }
                Churn::Release(pick) => {
                    if !live.is_empty() {
                        let (use_id, _) = live.swap_remove(pick % live.len());
                        registry.release(use_id, &mut model).expect("release");
                    }
                }
            }

            assert_consistent(&registry);
            let keys: HashSet<(u32, String)> = live
                .iter()
                .map(|(_, key)| (key.object_id, key.stack_name.folded().to_string()))
                .collect();
            prop_assert_eq!(registry.occupancy(), keys.len());
            for (use_id, key) in &live {
                let record = registry.find_key(key);
                prop_assert_eq!(record, registry.get_parent(*use_id));
                let object = registry.parent_object(*use_id).expect("resolved");
                prop_assert_eq!(registry.lookup(object), record);
            }
        }
    }
}
