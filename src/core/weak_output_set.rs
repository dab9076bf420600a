use std::{
    collections::HashMap,
    mem::take,
    rc::{Rc, Weak},
};

use super::{AdaptiveObject, NodeHeader, NodeKey};


/// Number of slots of the array representation.
pub const ARRAY_CAPACITY: usize = 8;

/// Number of `add`/`remove` calls between two full compactions.
pub const COMPACTION_INTERVAL: usize = 100;

type WeakNode = Weak<dyn AdaptiveObject>;

/// Set of dependents of a node, held by weak references.
///
/// The representation grows from a single reference to a small array and then to a hash set.
/// References to collected nodes are evicted when `add` or `remove` scans past them,
/// and by a full compaction every [`COMPACTION_INTERVAL`] operations.
#[derive(Default)]
pub struct WeakOutputSet {
    repr: Repr,
    ops: usize,
}

#[derive(Default)]
enum Repr {
    #[default]
    Empty,
    Single(WeakNode),
    Array(Box<[Option<WeakNode>; ARRAY_CAPACITY]>),
    Set(HashMap<NodeKey, WeakNode>),
}

impl WeakOutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node`.
    ///
    /// Returns `false` if `node` is already a member or is constant.
    pub fn add(&mut self, node: &Rc<dyn AdaptiveObject>) -> bool {
        if node.header().is_constant() {
            return false;
        }
        self.tick();
        self.insert(NodeHeader::downgrade(node))
    }

    /// Removes `node`.
    ///
    /// Returns `false` if `node` is not a member.
    pub fn remove(&mut self, node: &dyn AdaptiveObject) -> bool {
        self.tick();
        let key = NodeKey::of(node);
        match &mut self.repr {
            Repr::Empty => false,
            Repr::Single(weak) => {
                let found = NodeKey::of_weak(weak) == key;
                if found || weak.strong_count() == 0 {
                    self.repr = Repr::Empty;
                }
                found
            }
            Repr::Array(slots) => {
                let mut found = false;
                for slot in slots.iter_mut() {
                    if let Some(weak) = slot {
                        if NodeKey::of_weak(weak) == key {
                            *slot = None;
                            found = true;
                        } else if weak.strong_count() == 0 {
                            *slot = None;
                        }
                    }
                }
                self.shrink_array();
                found
            }
            Repr::Set(set) => {
                let found = set.remove(&key).is_some();
                set.retain(|_, weak| weak.strong_count() > 0);
                match set.len() {
                    0 => self.repr = Repr::Empty,
                    1 => {
                        if let Some(weak) = take(set).into_values().next() {
                            self.repr = Repr::Single(weak);
                        }
                    }
                    _ => {}
                }
                found
            }
        }
    }

    /// Moves all live members into `buffer` and clears the set.
    ///
    /// Returns the number of members moved.
    pub fn consume(&mut self, buffer: &mut Vec<Rc<dyn AdaptiveObject>>) -> usize {
        self.ops = 0;
        let len = buffer.len();
        match take(&mut self.repr) {
            Repr::Empty => {}
            Repr::Single(weak) => buffer.extend(weak.upgrade()),
            Repr::Array(slots) => {
                buffer.extend(slots.iter().flatten().filter_map(|weak| weak.upgrade()))
            }
            Repr::Set(set) => buffer.extend(set.values().filter_map(|weak| weak.upgrade())),
        }
        buffer.len() - len
    }

    /// Returns `true` if there is definitely no live member.
    ///
    /// May return `false` when every member has already been collected.
    pub fn is_empty(&self) -> bool {
        matches!(self.repr, Repr::Empty)
    }

    /// Number of live members.
    pub fn live_count(&self) -> usize {
        self.iter_weak().filter(|weak| weak.strong_count() > 0).count()
    }

    fn iter_weak(&self) -> Box<dyn Iterator<Item = &WeakNode> + '_> {
        match &self.repr {
            Repr::Empty => Box::new(std::iter::empty()),
            Repr::Single(weak) => Box::new(std::iter::once(weak)),
            Repr::Array(slots) => Box::new(slots.iter().flatten()),
            Repr::Set(set) => Box::new(set.values()),
        }
    }

    fn tick(&mut self) {
        self.ops += 1;
        if self.ops >= COMPACTION_INTERVAL {
            self.ops = 0;
            self.compact();
        }
    }

    fn compact(&mut self) {
        let members: Vec<WeakNode> = match take(&mut self.repr) {
            Repr::Empty => Vec::new(),
            Repr::Single(weak) => vec![weak],
            Repr::Array(slots) => {
                let slots = *slots;
                slots.into_iter().flatten().collect()
            }
            Repr::Set(set) => set.into_values().collect(),
        };
        let before = members.len();
        for weak in members {
            if weak.strong_count() > 0 {
                self.insert(weak);
            }
        }
        tracing::trace!(before, after = self.live_count(), "weak output set compacted");
    }

    fn insert(&mut self, weak: WeakNode) -> bool {
        let key = NodeKey::of_weak(&weak);
        match &mut self.repr {
            Repr::Empty => {
                self.repr = Repr::Single(weak);
                true
            }
            Repr::Single(current) => {
                if NodeKey::of_weak(current) == key {
                    return false;
                }
                if current.strong_count() == 0 {
                    *current = weak;
                    return true;
                }
                let mut slots = empty_slots();
                slots[0] = Some(current.clone());
                slots[1] = Some(weak);
                self.repr = Repr::Array(slots);
                true
            }
            Repr::Array(slots) => {
                let mut vacant = None;
                for (index, slot) in slots.iter_mut().enumerate() {
                    if let Some(current) = slot {
                        if NodeKey::of_weak(current) == key {
                            return false;
                        }
                        if current.strong_count() == 0 {
                            *slot = None;
                        }
                    }
                    if slot.is_none() && vacant.is_none() {
                        vacant = Some(index);
                    }
                }
                if let Some(index) = vacant {
                    slots[index] = Some(weak);
                } else {
                    let mut set: HashMap<NodeKey, WeakNode> = slots
                        .iter_mut()
                        .filter_map(Option::take)
                        .map(|w| (NodeKey::of_weak(&w), w))
                        .collect();
                    set.insert(key, weak);
                    tracing::trace!(len = set.len(), "weak output set promoted to hash set");
                    self.repr = Repr::Set(set);
                }
                true
            }
            Repr::Set(set) => {
                if set.contains_key(&key) {
                    return false;
                }
                set.insert(key, weak);
                true
            }
        }
    }

    fn shrink_array(&mut self) {
        let Repr::Array(slots) = &mut self.repr else {
            unreachable!("`shrink_array` called on a non-array representation");
        };
        let mut live = slots.iter_mut().filter_map(Option::take);
        let first = live.next();
        let second = live.next();
        let repr = match (first, second) {
            (None, _) => Repr::Empty,
            (Some(weak), None) => Repr::Single(weak),
            (Some(first), Some(second)) => {
                let mut packed = empty_slots();
                packed[0] = Some(first);
                packed[1] = Some(second);
                for (slot, weak) in packed[2..].iter_mut().zip(live) {
                    *slot = Some(weak);
                }
                Repr::Array(packed)
            }
        };
        self.repr = repr;
    }
}

fn empty_slots() -> Box<[Option<WeakNode>; ARRAY_CAPACITY]> {
    Box::new(std::array::from_fn(|_| None))
}

impl std::fmt::Debug for WeakOutputSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let repr = match &self.repr {
            Repr::Empty => "empty",
            Repr::Single(_) => "single",
            Repr::Array(_) => "array",
            Repr::Set(_) => "set",
        };
        f.debug_struct("WeakOutputSet")
            .field("repr", &repr)
            .field("live", &self.live_count())
            .finish()
    }
}
