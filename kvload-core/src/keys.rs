use crate::constants::KEY_INDEX_WIDTH;
use rand::Rng;
use std::sync::Arc;

/// The fixed pool of keys an iteration samples from.
///
/// Generation is deterministic in the size, so two processes configured alike hit the same
/// keys. Cloning is cheap; the keys themselves are shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyUniverse {
    keys: Arc<[String]>,
}

impl KeyUniverse {
    pub fn build(size: usize) -> Self {
        let keys: Vec<String> = (0..size).map(key_for_index).collect();
        Self { keys: keys.into() }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Uniformly select a key. `None` only for an empty universe.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        if self.keys.is_empty() {
            None
        } else {
            let idx = rng.gen_range(0..self.keys.len());
            Some(&self.keys[idx])
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

pub fn key_for_index(index: usize) -> String {
    format!("k{index:0width$}", width = KEY_INDEX_WIDTH)
}
