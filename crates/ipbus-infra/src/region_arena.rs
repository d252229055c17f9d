//! Reusing allocator for shared memory regions.
//!
//! Regions are grouped by allocated size. A request for `min_size` bytes
//! reuses an idle region whose size lies in `[min_size, 2 * min_size)` and
//! whose tag matches; otherwise a fresh region of exactly `min_size` bytes is
//! created. A region is idle when the arena holds the only handle to it.
//!
//! Entries that have not been handed out for longer than the idle window are
//! evicted on every allocation and on [`RegionArena::maintain`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use ipbus_core::MemoryRegion;
use tracing::trace;

type FreeFn = Box<dyn FnOnce() + Send>;

/// Size-classed pool of [`MemoryRegion`]s.
pub struct RegionArena {
    entries: BTreeMap<usize, Vec<ArenaEntry>>,
    idle: Duration,
    next_id: u64,
}

struct ArenaEntry {
    region: MemoryRegion,
    last_alloc: Instant,
    tag: Option<String>,
    on_free: FreeGuard,
}

/// Runs the free callback of an allocation exactly once.
struct FreeGuard(Option<FreeFn>);

impl Drop for FreeGuard {
    fn drop(&mut self) {
        if let Some(free) = self.0.take() {
            free();
        }
    }
}

impl RegionArena {
    pub fn new(idle: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            idle,
            next_id: 1,
        }
    }

    /// Allocate a region of at least `min_size` bytes.
    pub fn alloc(&mut self, min_size: usize, tag: Option<&str>) -> MemoryRegion {
        self.alloc_inner(min_size, tag, None)
    }

    /// Like [`alloc`](Self::alloc), running `free` once the region is
    /// released by every client, handed out again, or evicted.
    pub fn alloc_with_free(
        &mut self,
        min_size: usize,
        tag: Option<&str>,
        free: impl FnOnce() + Send + 'static,
    ) -> MemoryRegion {
        self.alloc_inner(min_size, tag, Some(Box::new(free)))
    }

    fn alloc_inner(
        &mut self,
        min_size: usize,
        tag: Option<&str>,
        mut free: Option<FreeFn>,
    ) -> MemoryRegion {
        let now = Instant::now();
        let upper = min_size.saturating_mul(2);

        let reused = self
            .entries
            .range_mut(min_size..upper)
            .flat_map(|(_, entries)| entries.iter_mut())
            .find(|entry| entry.region.ref_count() == 1 && entry.tag.as_deref() == tag)
            .map(|entry| {
                entry.last_alloc = now;
                // Replacing the guard runs the previous allocation's callback.
                entry.on_free = FreeGuard(free.take());
                entry.region.clone()
            });

        let region = match reused {
            Some(region) => {
                trace!(region = region.id(), min_size, len = region.len(), "reusing region");
                region
            }
            None => {
                let region = MemoryRegion::new(self.next_id, min_size);
                self.next_id += 1;
                trace!(region = region.id(), min_size, "allocating region");
                self.entries.entry(min_size).or_default().push(ArenaEntry {
                    region: region.clone(),
                    last_alloc: now,
                    tag: tag.map(ToOwned::to_owned),
                    on_free: FreeGuard(free),
                });
                region
            }
        };

        self.maintain_at(now);
        region
    }

    /// Evict expired entries and run callbacks of released regions.
    pub fn maintain(&mut self) {
        self.maintain_at(Instant::now());
    }

    fn maintain_at(&mut self, now: Instant) {
        let idle = self.idle;
        self.entries.retain(|_, entries| {
            entries.retain_mut(|entry| {
                if entry.region.ref_count() == 1 {
                    entry.on_free = FreeGuard(None);
                }
                now.duration_since(entry.last_alloc) < idle
            });
            !entries.is_empty()
        });
    }

    /// Number of regions currently tracked.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RegionArena {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl std::fmt::Debug for RegionArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionArena")
            .field("regions", &self.len())
            .field("idle", &self.idle)
            .finish()
    }
}
