//! Shared memory region handles.
//!
//! A [`MemoryRegion`] is a reference-counted capability to a buffer owned by
//! the engine. Cloning the handle shares the buffer; the engine can tell when
//! every client handle is gone via [`MemoryRegion::ref_count`] and reclaim
//! or reuse the buffer.
//!
//! Mapping a region yields a view that borrows the handle, so a view can never
//! outlive the region (and with it, the message that delivered it). Mapping
//! never blocks: a write view excludes every other view, and a conflicting
//! `map`/`map_mut` fails with [`RegionError::Busy`].

use std::ops::{Bound, Deref, DerefMut, RangeBounds};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use thiserror::Error;

/// Errors raised when mapping a region.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("range {offset}..{end} out of bounds for region of {len} bytes")]
    OutOfBounds { offset: usize, end: usize, len: usize },

    #[error("invalid map size {0} (use -1 to map to the end)")]
    InvalidSize(i64),

    #[error("region {0} is mapped by a conflicting view")]
    Busy(u64),
}

struct RegionInner {
    id: u64,
    len: usize,
    bytes: RwLock<Box<[u8]>>,
}

/// Handle to an engine-owned shared memory region.
#[derive(Clone)]
pub struct MemoryRegion {
    inner: Arc<RegionInner>,
}

impl MemoryRegion {
    /// Allocate a zeroed region. Called by engines; clients receive regions
    /// attached to messages.
    pub fn new(id: u64, size: usize) -> Self {
        Self {
            inner: Arc::new(RegionInner {
                id,
                len: size,
                bytes: RwLock::new(vec![0u8; size].into_boxed_slice()),
            }),
        }
    }

    /// Engine-assigned identifier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live handles to this region, including the engine's own.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Map a byte range of the region for reading.
    pub fn map<R: RangeBounds<usize>>(&self, range: R) -> Result<RegionView<'_>, RegionError> {
        let (start, end) = resolve_range(&range, self.len())?;
        let guard = match self.inner.bytes.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(RegionError::Busy(self.id())),
        };
        Ok(RegionView { guard, start, end })
    }

    /// Map `size` bytes starting at `offset`; a size of `-1` maps to the end
    /// of the region.
    pub fn map_sized(&self, offset: usize, size: i64) -> Result<RegionView<'_>, RegionError> {
        match size {
            -1 => self.map(offset..),
            size if size >= 0 => {
                let size = usize::try_from(size).map_err(|_| RegionError::InvalidSize(size))?;
                let end = offset.checked_add(size).ok_or(RegionError::OutOfBounds {
                    offset,
                    end: usize::MAX,
                    len: self.len(),
                })?;
                self.map(offset..end)
            }
            size => Err(RegionError::InvalidSize(size)),
        }
    }

    /// Map a byte range for writing. Used by the side that fills the region
    /// before handing it to the engine.
    pub fn map_mut<R: RangeBounds<usize>>(
        &self,
        range: R,
    ) -> Result<RegionViewMut<'_>, RegionError> {
        let (start, end) = resolve_range(&range, self.len())?;
        let guard = match self.inner.bytes.try_write() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(RegionError::Busy(self.id())),
        };
        Ok(RegionViewMut { guard, start, end })
    }

    /// `true` if both handles refer to the same underlying buffer.
    pub fn same_region(&self, other: &MemoryRegion) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

fn resolve_range<R: RangeBounds<usize>>(range: &R, len: usize) -> Result<(usize, usize), RegionError> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };

    if start > end || end > len {
        return Err(RegionError::OutOfBounds {
            offset: start,
            end,
            len,
        });
    }
    Ok((start, end))
}

/// Read-only window over part of a region.
pub struct RegionView<'a> {
    guard: RwLockReadGuard<'a, Box<[u8]>>,
    start: usize,
    end: usize,
}

impl Deref for RegionView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.start..self.end]
    }
}

impl AsRef<[u8]> for RegionView<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for RegionView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionView")
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

/// Writable window over part of a region.
pub struct RegionViewMut<'a> {
    guard: RwLockWriteGuard<'a, Box<[u8]>>,
    start: usize,
    end: usize,
}

impl Deref for RegionViewMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.start..self.end]
    }
}

impl DerefMut for RegionViewMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard[self.start..self.end]
    }
}

impl fmt::Debug for RegionViewMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionViewMut")
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}
