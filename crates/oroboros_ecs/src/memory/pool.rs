//! # Pool Allocator
//!
//! Segmented block allocator for objects that are frequently allocated and freed.
//!
//! Storage grows one segment at a time. Existing segments are never moved or
//! resized, so a [`PoolHandle`] stays valid until it is freed.

/// A growable pool allocator for same-typed objects.
///
/// Slots are handed out from a LIFO free list. When the free list is empty a
/// new segment of `segment_size` slots is appended.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: PoolAllocator<String> = PoolAllocator::new(256);
///
/// let handle = pool.allocate("Bob".to_string());
/// assert_eq!(pool.get(handle).map(String::as_str), Some("Bob"));
/// pool.free(handle);
/// ```
pub struct PoolAllocator<T> {
    /// Fixed-size segments, appended on demand.
    segments: Vec<Box<[Option<T>]>>,
    /// Slots per segment.
    segment_size: usize,
    /// Free list - indices of available slots, next slot on top.
    free_list: Vec<usize>,
    /// Number of allocated objects.
    allocated_count: usize,
}

/// Handle to an allocated object in a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    /// Index into the pool.
    index: usize,
}

impl PoolHandle {
    /// Returns the flat slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

impl<T> PoolAllocator<T> {
    /// Creates an empty pool. No segment is allocated until first use.
    ///
    /// # Arguments
    ///
    /// * `segment_size` - Slots added per growth step
    ///
    /// # Panics
    ///
    /// Panics if `segment_size` is zero.
    #[must_use]
    pub fn new(segment_size: usize) -> Self {
        assert!(segment_size > 0, "Segment size must be greater than zero");

        Self {
            segments: Vec::new(),
            segment_size,
            free_list: Vec::new(),
            allocated_count: 0,
        }
    }

    /// Returns the total number of slots across all segments.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.segments.len() * self.segment_size
    }

    /// Returns the number of segments allocated so far.
    #[inline]
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the number of currently allocated objects.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity() - self.allocated_count
    }

    /// Allocates a slot and stores the object.
    ///
    /// **O(1)** amortized. Grows by one segment when full.
    ///
    /// # Arguments
    ///
    /// * `value` - The object to store
    ///
    /// # Returns
    ///
    /// A handle to the allocated object.
    pub fn allocate(&mut self, value: T) -> PoolHandle {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => self.grow(),
        };

        let (segment, offset) = self.locate(index);
        self.segments[segment][offset] = Some(value);
        self.allocated_count += 1;

        PoolHandle { index }
    }

    /// Frees an allocated object.
    ///
    /// # Arguments
    ///
    /// * `handle` - The handle to free
    ///
    /// # Returns
    ///
    /// The freed object, or None if handle was invalid or already freed.
    pub fn free(&mut self, handle: PoolHandle) -> Option<T> {
        if handle.index >= self.capacity() {
            return None;
        }

        let (segment, offset) = self.locate(handle.index);
        let value = self.segments[segment][offset].take()?;
        self.free_list.push(handle.index);
        self.allocated_count -= 1;

        Some(value)
    }

    /// Gets a reference to an allocated object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        let (segment, offset) = self.locate(handle.index);
        self.segments.get(segment)?[offset].as_ref()
    }

    /// Gets a mutable reference to an allocated object.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        let (segment, offset) = self.locate(handle.index);
        self.segments.get_mut(segment)?[offset].as_mut()
    }

    /// Drops every object and marks all slots free. Segments are kept.
    pub fn clear(&mut self) {
        for segment in &mut self.segments {
            for slot in segment.iter_mut() {
                *slot = None;
            }
        }
        self.free_list.clear();
        self.free_list.extend((0..self.capacity()).rev());
        self.allocated_count = 0;
    }

    /// Iterates over all allocated objects.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.segments
            .iter()
            .flat_map(|segment| segment.iter())
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|v| (PoolHandle { index }, v)))
    }

    /// Iterates mutably over all allocated objects.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolHandle, &mut T)> {
        self.segments
            .iter_mut()
            .flat_map(|segment| segment.iter_mut())
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|v| (PoolHandle { index }, v)))
    }

    #[inline]
    const fn locate(&self, index: usize) -> (usize, usize) {
        (index / self.segment_size, index % self.segment_size)
    }

    /// Appends a segment and returns its first slot. The rest go on the free list.
    fn grow(&mut self) -> usize {
        let base = self.capacity();
        let segment: Vec<Option<T>> = (0..self.segment_size).map(|_| None).collect();
        self.segments.push(segment.into_boxed_slice());
        // Lowest index ends up on top of the stack.
        self.free_list.extend((base + 1..base + self.segment_size).rev());
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocate_free() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(10);

        let h1 = pool.allocate(42);
        assert_eq!(*pool.get(h1).unwrap(), 42);
        assert_eq!(pool.allocated_count(), 1);

        let freed = pool.free(h1).unwrap();
        assert_eq!(freed, 42);
        assert_eq!(pool.allocated_count(), 0);
        assert!(pool.free(h1).is_none());
    }

    #[test]
    fn test_pool_grows_by_segment() {
        let mut pool: PoolAllocator<u8> = PoolAllocator::new(2);
        assert_eq!(pool.capacity(), 0);

        let a = pool.allocate(1);
        let b = pool.allocate(2);
        assert_eq!(pool.segment_count(), 1);

        let c = pool.allocate(3);
        assert_eq!(pool.segment_count(), 2);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.free_count(), 1);

        // Earlier handles survive growth.
        assert_eq!(pool.get(a), Some(&1));
        assert_eq!(pool.get(b), Some(&2));
        assert_eq!(pool.get(c), Some(&3));
    }

    #[test]
    fn test_pool_reuse() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(1);

        let h1 = pool.allocate(1);
        pool.free(h1);

        let h2 = pool.allocate(2);
        assert_eq!(h1.index, h2.index); // Same slot reused
        assert_eq!(*pool.get(h2).unwrap(), 2);
        assert_eq!(pool.segment_count(), 1);
    }

    #[test]
    fn test_pool_iter_and_clear() {
        let mut pool: PoolAllocator<String> = PoolAllocator::new(3);
        for name in ["a", "b", "c", "d"] {
            pool.allocate(name.to_string());
        }
        for (_, value) in pool.iter_mut() {
            value.push('!');
        }
        let mut seen: Vec<_> = pool.iter().map(|(_, v)| v.clone()).collect();
        seen.sort();
        assert_eq!(seen, ["a!", "b!", "c!", "d!"]);

        pool.clear();
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.free_count(), 6);
        assert_eq!(pool.allocate("x".to_string()).index(), 0);
    }

    #[test]
    fn test_pool_out_of_range_handle() {
        let mut pool: PoolAllocator<u32> = PoolAllocator::new(4);
        let stray = PoolHandle { index: 99 };
        assert!(pool.get(stray).is_none());
        assert!(pool.get_mut(stray).is_none());
        assert!(pool.free(stray).is_none());
    }
}
