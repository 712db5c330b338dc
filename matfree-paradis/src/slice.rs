use std::marker::PhantomData;

/// Unsynchronized shared access to the elements of a mutable slice.
///
/// Obtaining the access consumes the exclusive borrow of the slice, so the access is the only
/// way to reach the data for its lifetime.
pub struct ParallelSliceAccess<'a, T> {
    ptr: *mut T,
    len: usize,
    marker: PhantomData<&'a mut T>,
}

impl<'a, T> Copy for ParallelSliceAccess<'a, T> {}

impl<'a, T> Clone for ParallelSliceAccess<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

unsafe impl<'a, T: Sync> Sync for ParallelSliceAccess<'a, T> {}
unsafe impl<'a, T: Send> Send for ParallelSliceAccess<'a, T> {}

impl<'a, T> ParallelSliceAccess<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    ///
    /// `index` must be in bounds, and no other reference to the same element may be alive
    /// while the returned reference is in use.
    pub unsafe fn get_unchecked_mut(&self, index: usize) -> &'a mut T {
        debug_assert!(index < self.len);
        &mut *self.ptr.add(index)
    }
}
