//! Reusable symbolic Cholesky factorizations keyed by sparsity pattern.
//!
//! Repeated fairing of the same region (e.g. interactive sculpt strokes) produces
//! identical matrix patterns with new values. The cache keeps the symbolic
//! analysis for each pattern so only the numeric factorization is redone.
//!
//! The cache is owned by a [`FairContext`](super::FairContext), never global.
//! It tracks a topology key (faces, free set, continuity, weighting) and
//! drops every entry as soon as that key changes.
//!
//! ```ignore
//! let mut ctx = FairContext::new();
//! fair_with_context(&mut mesh, &free, &fixed, Continuity::Tan, &options, &mut ctx)?;
//! fair_with_context(&mut mesh, &free, &fixed, Continuity::Tan, &options, &mut ctx)?;
//! assert!(ctx.cache.stats().hits > 0);
//! ```

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nalgebra_sparse::factorization::CscSymbolicCholesky;
use nalgebra_sparse::pattern::SparsityPattern;

#[derive(Debug, Clone)]
struct CachedSymbolic {
    pattern: SparsityPattern,
    symbolic: Arc<CscSymbolicCholesky>,
}

#[derive(Debug, Default)]
pub struct FactorizationCache {
    entries: HashMap<u64, CachedSymbolic>,
    topology_key: Option<u64>,
    hits: usize,
    misses: usize,
    invalidations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FactorizationCacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub invalidations: usize,
}

impl FactorizationCacheStats {
    /// Returns 0.0 if the cache was never queried.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Structural fingerprint of a sparsity pattern.
#[must_use]
pub fn pattern_fingerprint(pattern: &SparsityPattern) -> u64 {
    let mut hasher = DefaultHasher::new();
    pattern.major_dim().hash(&mut hasher);
    pattern.minor_dim().hash(&mut hasher);
    pattern.major_offsets().hash(&mut hasher);
    pattern.minor_indices().hash(&mut hasher);
    hasher.finish()
}

impl FactorizationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> FactorizationCacheStats {
        FactorizationCacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            invalidations: self.invalidations,
        }
    }

    /// Clears all entries and counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.topology_key = None;
        self.hits = 0;
        self.misses = 0;
        self.invalidations = 0;
    }

    /// Drops all entries, keeping counters.
    pub fn invalidate(&mut self) {
        if !self.entries.is_empty() {
            self.invalidations += 1;
        }
        self.entries.clear();
        self.topology_key = None;
    }

    /// Records the topology the next lookups belong to. Returns true (and
    /// empties the cache) when it differs from the previous one.
    pub fn sync_topology(&mut self, key: u64) -> bool {
        match self.topology_key {
            Some(current) if current == key => false,
            _ => {
                let changed = self.topology_key.is_some();
                if changed {
                    log::debug!("factorization cache invalidated: topology changed");
                    self.invalidate();
                }
                self.topology_key = Some(key);
                changed
            }
        }
    }

    /// Symbolic factorization for `pattern`, computed on a miss.
    pub fn get_or_insert_symbolic(&mut self, pattern: &SparsityPattern) -> Arc<CscSymbolicCholesky> {
        let key = pattern_fingerprint(pattern);
        if let Some(cached) = self.entries.get(&key) {
            if cached.pattern == *pattern {
                self.hits += 1;
                return Arc::clone(&cached.symbolic);
            }
        }
        self.misses += 1;
        let symbolic = Arc::new(CscSymbolicCholesky::factor(pattern.clone()));
        self.entries.insert(
            key,
            CachedSymbolic {
                pattern: pattern.clone(),
                symbolic: Arc::clone(&symbolic),
            },
        );
        symbolic
    }

    /// Checks for a cached symbolic factorization without computing one.
    #[must_use]
    pub fn has_symbolic(&self, pattern: &SparsityPattern) -> bool {
        self.entries
            .get(&pattern_fingerprint(pattern))
            .is_some_and(|cached| cached.pattern == *pattern)
    }
}
