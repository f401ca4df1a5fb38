use std::sync::Arc;

/// A single-slot cache keyed on the full input tuple of one query operation.
///
/// A lookup with the stored key returns the cached value. Any other key drops
/// the slot and recomputes. Failed computations are not stored.
#[derive(Debug)]
pub struct Memo<K, V> {
    slot: Option<(K, Arc<V>)>,
    computations: usize,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            slot: None,
            computations: 0,
        }
    }
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn get_or_try_compute<E, F>(&mut self, key: K, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some((cached_key, value)) = &self.slot {
            if *cached_key == key {
                return Ok(Arc::clone(value));
            }
        }

        self.slot = None;
        self.computations += 1;
        let value = Arc::new(compute(&key)?);
        self.slot = Some((key, Arc::clone(&value)));
        Ok(value)
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    /// How many times the slot has been (re)computed.
    pub fn computations(&self) -> usize {
        self.computations
    }
}
