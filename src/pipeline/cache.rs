use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AlignmentError;

/// Everything derived from one audio file by the acoustic model.
#[derive(Debug, Clone)]
pub struct CachedAudio {
    pub key: String,
    /// Cache generation the entry was built under.
    pub generation: u64,
    pub samples: Arc<[f32]>,
    pub logits: Vec<Vec<f32>>,
    pub log_probs: Vec<Vec<f32>>,
    pub ppg: Vec<Vec<f32>>,
    pub ppg_dim: usize,
    /// Seconds per emission frame.
    pub frame_secs: f64,
}

impl CachedAudio {
    pub fn num_frames(&self) -> usize {
        self.log_probs.len()
    }
}

#[derive(Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<String, Arc<CachedAudio>>,
    insertion_order: VecDeque<String>,
    build_slots: HashMap<String, Arc<Mutex<()>>>,
}

/// Audio-keyed store of model outputs.
///
/// At most one build runs per key; builds for other keys proceed in
/// parallel. `invalidate` drops every entry and bumps the generation, and a
/// build that started under an older generation is handed back to its caller
/// without being stored.
pub struct FeatureCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl FeatureCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, CacheState>, AlignmentError> {
        self.state
            .lock()
            .map_err(|_| AlignmentError::runtime("feature cache lock", "cache mutex poisoned"))
    }

    pub fn generation(&self) -> Result<u64, AlignmentError> {
        Ok(self.lock_state()?.generation)
    }

    pub fn is_current(&self, entry: &CachedAudio) -> Result<bool, AlignmentError> {
        Ok(entry.generation == self.generation()?)
    }

    pub fn get(&self, key: &str) -> Result<Option<Arc<CachedAudio>>, AlignmentError> {
        Ok(self.lock_state()?.entries.get(key).cloned())
    }

    pub fn len(&self) -> Result<usize, AlignmentError> {
        Ok(self.lock_state()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, AlignmentError> {
        Ok(self.len()? == 0)
    }

    /// Returns the entry for `key`, running `build` with the current
    /// generation on a miss.
    pub fn get_or_build<F>(&self, key: &str, build: F) -> Result<Arc<CachedAudio>, AlignmentError>
    where
        F: FnOnce(u64) -> Result<CachedAudio, AlignmentError>,
    {
        let slot = {
            let mut state = self.lock_state()?;
            if let Some(entry) = state.entries.get(key) {
                tracing::debug!(key, generation = entry.generation, "feature cache hit");
                return Ok(Arc::clone(entry));
            }
            Arc::clone(state.build_slots.entry(key.to_string()).or_default())
        };

        let _building = slot
            .lock()
            .map_err(|_| AlignmentError::runtime("feature cache build slot", "slot mutex poisoned"))?;

        let generation = {
            let state = self.lock_state()?;
            if let Some(entry) = state.entries.get(key) {
                tracing::debug!(key, "feature cache filled by concurrent build");
                return Ok(Arc::clone(entry));
            }
            state.generation
        };

        tracing::debug!(key, generation, "feature cache miss, building");
        let entry = match build(generation) {
            Ok(entry) => Arc::new(entry),
            Err(err) => {
                let mut state = self.lock_state()?;
                if state
                    .build_slots
                    .get(key)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot))
                {
                    state.build_slots.remove(key);
                }
                tracing::debug!(key, error = %err, "feature cache build failed");
                return Err(err);
            }
        };

        let mut state = self.lock_state()?;
        if state.generation != generation {
            tracing::debug!(
                key,
                built_under = generation,
                current = state.generation,
                "discarding feature cache entry built before invalidation"
            );
            return Ok(entry);
        }
        state.entries.insert(key.to_string(), Arc::clone(&entry));
        state.insertion_order.retain(|k| k != key);
        state.insertion_order.push_back(key.to_string());
        while state.entries.len() > self.capacity {
            let Some(oldest) = state.insertion_order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            state.build_slots.remove(&oldest);
            tracing::debug!(key = %oldest, "evicted feature cache entry");
        }
        Ok(entry)
    }

    /// Drops every entry. Results built from older generations should be
    /// discarded by whoever holds them.
    pub fn invalidate(&self) -> Result<u64, AlignmentError> {
        let mut state = self.lock_state()?;
        state.generation += 1;
        let dropped = state.entries.len();
        state.entries.clear();
        state.insertion_order.clear();
        state.build_slots.clear();
        tracing::info!(generation = state.generation, dropped, "feature cache invalidated");
        Ok(state.generation)
    }
}
