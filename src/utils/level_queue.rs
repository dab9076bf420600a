use std::cmp::{max, min};

use derive_ex::Ex;

use crate::core::{Level, MAX_LEVEL};


/// Priority queue keyed by level. Duplicates are allowed.
#[derive(Ex)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct LevelQueue<T> {
    buckets: Vec<Vec<T>>,
    start: Level,
    last: Level,
    len: usize,
}
impl<T> LevelQueue<T> {
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
            start: Level::MAX,
            last: Level::MIN,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    fn set_empty(&mut self) {
        self.start = Level::MAX;
        self.last = Level::MIN;
    }

    /// # Panics
    ///
    /// Panics if `level` is greater than [`MAX_LEVEL`].
    pub fn push(&mut self, level: Level, item: T) {
        assert!(level <= MAX_LEVEL, "level {level} exceeds {MAX_LEVEL}");
        if self.buckets.len() <= level {
            self.buckets.resize_with(level + 1, Vec::new);
        }
        self.buckets[level].push(item);
        self.start = min(self.start, level);
        self.last = max(self.last, level);
        self.len += 1;
    }

    /// Removes an item with the lowest level.
    pub fn pop(&mut self) -> Option<(Level, T)> {
        while self.start <= self.last {
            let level = self.start;
            if let Some(item) = self.buckets[level].pop() {
                self.len -= 1;
                if self.len == 0 {
                    self.set_empty();
                }
                return Some((level, item));
            }
            self.start += 1;
        }
        self.set_empty();
        None
    }

    pub fn clear(&mut self) {
        if !self.is_empty() {
            for bucket in &mut self.buckets[self.start..=self.last] {
                bucket.clear();
            }
        }
        self.len = 0;
        self.set_empty();
    }
}
