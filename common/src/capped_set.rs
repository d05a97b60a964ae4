use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Set with a fixed capacity; inserting into a full set evicts the
/// oldest entry.
#[derive(Debug)]
pub struct CappedSet<T> {
    capacity: usize,
    members: HashSet<T>,
    order: VecDeque<T>,
}

impl<T: Hash + Eq + Clone> CappedSet<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            members: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, value: T) {
        if self.members.contains(&value) {
            return;
        }
        while self.order.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.members.remove(&oldest);
        }
        self.members.insert(value.clone());
        self.order.push_back(value);
    }

    pub fn contains(&self, value: &T) -> bool {
        self.members.contains(value)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
