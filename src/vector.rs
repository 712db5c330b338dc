//! Vectors of scalars with host and device copies.
//!
//! A [`Vector`] owns its data or borrows it from the caller. Data may live in the host and in the
//! device memory space, and the vector records which of the two copies are valid. Requesting a
//! view in a memory space first brings that copy up to date, and requesting a mutable view
//! invalidates the other copy.
//!
//! Any number of read views may be held at the same time, while a mutable view is exclusive.
//! Requests that conflict with outstanding views fail with [`Error::State`] instead of blocking.
use crate::{Ceed, CopyMode, Error, MemType, NormType, Result, Scalar};
use itertools::izip;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

enum HostArray<'a> {
    Owned(Vec<Scalar>),
    Borrowed(&'a mut [Scalar]),
}

impl HostArray<'_> {
    fn as_slice(&self) -> &[Scalar] {
        match self {
            Self::Owned(values) => values,
            Self::Borrowed(values) => values,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [Scalar] {
        match self {
            Self::Owned(values) => values,
            Self::Borrowed(values) => values,
        }
    }
}

struct VectorStorage<'a> {
    host: HostArray<'a>,
    // Allocated on first use in the device memory space
    device: Option<Vec<Scalar>>,
    host_valid: bool,
    device_valid: bool,
}

impl<'a> VectorStorage<'a> {
    fn new(host: HostArray<'a>) -> Self {
        Self {
            host,
            device: None,
            host_valid: true,
            device_valid: false,
        }
    }

    fn is_valid(&self, mem: MemType) -> bool {
        match mem {
            MemType::Host => self.host_valid,
            MemType::Device => self.device_valid,
        }
    }

    /// Brings the copy in `mem` up to date with the authoritative copy.
    fn sync(&mut self, mem: MemType) {
        match mem {
            MemType::Host if !self.host_valid => {
                if let Some(device) = &self.device {
                    self.host.as_mut_slice().copy_from_slice(device);
                }
                self.host_valid = true;
            }
            MemType::Device if !self.device_valid => {
                let host = self.host.as_slice();
                match &mut self.device {
                    Some(device) => device.copy_from_slice(host),
                    None => self.device = Some(host.to_vec()),
                }
                self.device_valid = true;
            }
            _ => {}
        }
    }

    /// Make `mem` the only valid copy. The device copy is allocated if needed, but not
    /// synchronized.
    fn mark_written(&mut self, mem: MemType) {
        if mem == MemType::Device && self.device.is_none() {
            self.device = Some(vec![0.0; self.host.as_slice().len()]);
        }
        self.host_valid = mem == MemType::Host;
        self.device_valid = mem == MemType::Device;
    }

    fn slice(&self, mem: MemType) -> &[Scalar] {
        match mem {
            MemType::Host => self.host.as_slice(),
            MemType::Device => self.device.as_deref().unwrap_or_default(),
        }
    }

    fn slice_mut(&mut self, mem: MemType) -> &mut [Scalar] {
        match mem {
            MemType::Host => self.host.as_mut_slice(),
            MemType::Device => self.device.as_deref_mut().unwrap_or_default(),
        }
    }
}

impl Drop for VectorStorage<'_> {
    fn drop(&mut self) {
        // A borrowed array must hold the final values once the caller gets it back
        if matches!(self.host, HostArray::Borrowed(_)) {
            self.sync(MemType::Host);
        }
    }
}

/// A vector of scalars.
///
/// Cloning a vector returns a new handle to the same data.
#[derive(Clone)]
pub struct Vector<'a> {
    ceed: Ceed,
    len: usize,
    storage: Arc<RwLock<VectorStorage<'a>>>,
}

/// Optional vector binding for an operator field.
#[derive(Debug, Clone, Copy)]
pub enum VectorOpt<'v, 'a> {
    /// A passive vector owned by the binding.
    Some(&'v Vector<'a>),
    /// The vector supplied when the operator is applied.
    Active,
    /// No vector.
    None,
}

impl<'v, 'a> From<&'v Vector<'a>> for VectorOpt<'v, 'a> {
    fn from(vec: &'v Vector<'a>) -> Self {
        Self::Some(vec)
    }
}

impl<'v, 'a> VectorOpt<'v, 'a> {
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for Vector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("len", &self.len)
            .field("resource", &self.ceed.resource())
            .finish()
    }
}

impl fmt::Display for Vector<'_> {
    /// Lists the host values of the vector.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vector length {}", self.len)?;
        match self.view() {
            Ok(values) => {
                for value in values.iter() {
                    writeln!(f, "    {:.8}", value)?;
                }
                Ok(())
            }
            Err(_) => writeln!(f, "    <values not accessible>"),
        }
    }
}

impl<'a> Vector<'a> {
    fn from_host_array(ceed: &Ceed, host: HostArray<'a>) -> Self {
        let len = host.as_slice().len();
        Self {
            ceed: ceed.clone(),
            len,
            storage: Arc::new(RwLock::new(VectorStorage::new(host))),
        }
    }

    /// A zero-initialized vector of length `n`.
    pub fn create(ceed: &Ceed, n: usize) -> Self {
        Self::from_host_array(ceed, HostArray::Owned(vec![0.0; n]))
    }

    /// A vector holding a copy of `values`.
    pub fn from_slice(ceed: &Ceed, values: &[Scalar]) -> Self {
        Self::from_host_array(ceed, HostArray::Owned(values.to_vec()))
    }

    /// A vector taking ownership of `values`.
    pub fn from_vec(ceed: &Ceed, values: Vec<Scalar>) -> Self {
        Self::from_host_array(ceed, HostArray::Owned(values))
    }

    /// A vector that uses the caller's array as its host storage.
    ///
    /// Writes through the vector are visible in `values` once the vector and all its clones
    /// have been dropped.
    ///
    /// ```
    /// # use matfree::prelude::*;
    /// # fn main() -> matfree::Result<()> {
    /// # let ceed = Ceed::default_init();
    /// let mut values = [1.0, 2.0, 3.0];
    /// {
    ///     let vec = Vector::from_array(&ceed, &mut values);
    ///     vec.scale(2.0)?;
    /// }
    /// assert_eq!(values, [2.0, 4.0, 6.0]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_array(ceed: &Ceed, values: &'a mut [Scalar]) -> Self {
        Self::from_host_array(ceed, HostArray::Borrowed(values))
    }

    /// Wrap the caller's array, either by copying it or by borrowing it.
    pub fn wrap(ceed: &Ceed, mode: CopyMode, values: &'a mut [Scalar]) -> Self {
        match mode {
            CopyMode::CopyValues => Self::from_slice(ceed, values),
            CopyMode::UsePointer => Self::from_array(ceed, values),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn length(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ceed(&self) -> &Ceed {
        &self.ceed
    }

    /// Whether both handles refer to the same data.
    pub fn same_storage(&self, other: &Vector<'_>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.storage) as *const (),
            Arc::as_ptr(&other.storage) as *const (),
        )
    }

    fn check_mem_type(&self, mem: MemType) -> Result<()> {
        if mem == MemType::Device && self.ceed.preferred_mem_type() != MemType::Device {
            Err(Error::unsupported(format!(
                "backend {} has no device memory space",
                self.ceed.resource()
            )))
        } else {
            Ok(())
        }
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len == self.len {
            Ok(())
        } else {
            Err(Error::state(format!(
                "array of length {} does not fit a vector of length {}",
                len, self.len
            )))
        }
    }

    fn try_write(&self) -> Result<RwLockWriteGuard<'_, VectorStorage<'a>>> {
        self.storage
            .try_write()
            .ok_or_else(|| Error::state("vector has outstanding views"))
    }

    /// Read access to the host values.
    pub fn view(&self) -> Result<VectorView<'_, 'a>> {
        self.view_in(MemType::Host)
    }

    /// Read access to the values in the given memory space.
    ///
    /// If the copy in `mem` is stale it is synchronized first, which requires that no other
    /// views are outstanding.
    pub fn view_in(&self, mem: MemType) -> Result<VectorView<'_, 'a>> {
        self.check_mem_type(mem)?;
        match self.storage.try_read() {
            Some(guard) if guard.is_valid(mem) => return Ok(VectorView { guard, mem }),
            Some(_) => {}
            None => return Err(Error::state("vector has an outstanding read-write view")),
        }
        let mut guard = self.try_write()?;
        guard.sync(mem);
        Ok(VectorView {
            guard: RwLockWriteGuard::downgrade(guard),
            mem,
        })
    }

    /// Read-write access to the host values.
    pub fn view_mut(&self) -> Result<VectorViewMut<'_, 'a>> {
        self.view_mut_in(MemType::Host)
    }

    /// Read-write access to the values in the given memory space. The copy in the other memory
    /// space is invalidated.
    pub fn view_mut_in(&self, mem: MemType) -> Result<VectorViewMut<'_, 'a>> {
        self.check_mem_type(mem)?;
        let mut guard = self.try_write()?;
        guard.sync(mem);
        guard.mark_written(mem);
        Ok(VectorViewMut { guard, mem })
    }

    /// Write access without synchronization. The previous contents of the view are
    /// unspecified, so every entry must be overwritten.
    pub(crate) fn overwrite_in(&self, mem: MemType) -> Result<VectorViewMut<'_, 'a>> {
        self.check_mem_type(mem)?;
        let mut guard = self.try_write()?;
        guard.mark_written(mem);
        Ok(VectorViewMut { guard, mem })
    }

    /// Make the copy in `mem` valid.
    pub fn sync(&self, mem: MemType) -> Result<()> {
        self.check_mem_type(mem)?;
        self.try_write()?.sync(mem);
        Ok(())
    }

    pub fn set_value(&self, value: Scalar) -> Result<()> {
        self.overwrite_in(MemType::Host)?.fill(value);
        Ok(())
    }

    /// Copy `values` into the host storage.
    pub fn set_slice(&self, values: &[Scalar]) -> Result<()> {
        self.set_array(MemType::Host, values)
    }

    /// Copy `values` into the storage in `mem`, which becomes the only valid copy.
    pub fn set_array(&self, mem: MemType, values: &[Scalar]) -> Result<()> {
        self.check_len(values.len())?;
        self.overwrite_in(mem)?.copy_from_slice(values);
        Ok(())
    }

    /// Replace the host storage with the caller's array.
    pub fn set_borrowed(&self, values: &'a mut [Scalar]) -> Result<()> {
        self.check_len(values.len())?;
        let mut guard = self.try_write()?;
        guard.host = HostArray::Borrowed(values);
        guard.mark_written(MemType::Host);
        Ok(())
    }

    /// Replace the host storage with an owned array.
    pub fn set_vec(&self, values: Vec<Scalar>) -> Result<()> {
        self.check_len(values.len())?;
        let mut guard = self.try_write()?;
        guard.host = HostArray::Owned(values);
        guard.mark_written(MemType::Host);
        Ok(())
    }

    pub fn to_vec(&self) -> Result<Vec<Scalar>> {
        Ok(self.view()?.to_vec())
    }

    fn check_same_len(&self, other: &Vector<'_>) -> Result<()> {
        if self.len == other.len {
            Ok(())
        } else {
            Err(Error::shape(format!(
                "vector lengths {} and {} differ",
                self.len, other.len
            )))
        }
    }

    pub fn copy_from(&self, other: &Vector<'_>) -> Result<()> {
        self.check_same_len(other)?;
        if self.same_storage(other) {
            return Ok(());
        }
        let values = other.view()?;
        self.overwrite_in(MemType::Host)?.copy_from_slice(&values);
        Ok(())
    }

    pub fn norm(&self, ntype: NormType) -> Result<Scalar> {
        let values = self.view()?;
        let norm = match ntype {
            NormType::One => values.iter().map(|x| x.abs()).sum::<Scalar>(),
            NormType::Two => values.iter().map(|x| x * x).sum::<Scalar>().sqrt(),
            NormType::Max => values.iter().fold(0.0, |max, x| x.abs().max(max)),
        };
        Ok(norm)
    }

    /// `self = alpha * self`
    pub fn scale(&self, alpha: Scalar) -> Result<()> {
        self.view_mut()?.iter_mut().for_each(|y| *y *= alpha);
        Ok(())
    }

    /// `self = alpha * x + self`
    pub fn axpy(&self, alpha: Scalar, x: &Vector<'_>) -> Result<()> {
        self.axpby(alpha, x, 1.0)
    }

    /// `self = alpha * x + beta * self`
    pub fn axpby(&self, alpha: Scalar, x: &Vector<'_>, beta: Scalar) -> Result<()> {
        self.check_same_len(x)?;
        if self.same_storage(x) {
            return self.scale(alpha + beta);
        }
        let x = x.view()?;
        let mut y = self.view_mut()?;
        y.iter_mut()
            .zip(x.iter())
            .for_each(|(y, x)| *y = alpha * x + beta * *y);
        Ok(())
    }

    /// `self = x .* y`, entrywise.
    pub fn pointwise_mult(&self, x: &Vector<'_>, y: &Vector<'_>) -> Result<()> {
        self.check_same_len(x)?;
        self.check_same_len(y)?;
        // Copies, since either factor may share storage with self
        let x = x.to_vec()?;
        let y = y.to_vec()?;
        let mut w = self.overwrite_in(MemType::Host)?;
        for (w, x, y) in izip!(w.iter_mut(), &x, &y) {
            *w = x * y;
        }
        Ok(())
    }

    /// `self = self .* x`, entrywise.
    pub fn pointwise_scale(&self, x: &Vector<'_>) -> Result<()> {
        self.check_same_len(x)?;
        if self.same_storage(x) {
            return self.pointwise_square();
        }
        let x = x.view()?;
        let mut w = self.view_mut()?;
        w.iter_mut().zip(x.iter()).for_each(|(w, x)| *w *= x);
        Ok(())
    }

    /// `self = self .* self`, entrywise.
    pub fn pointwise_square(&self) -> Result<()> {
        self.view_mut()?.iter_mut().for_each(|w| *w *= *w);
        Ok(())
    }
}

/// Read access to the values of a [`Vector`], dereferencing to a slice.
pub struct VectorView<'v, 'a> {
    guard: RwLockReadGuard<'v, VectorStorage<'a>>,
    mem: MemType,
}

impl Deref for VectorView<'_, '_> {
    type Target = [Scalar];

    fn deref(&self) -> &[Scalar] {
        self.guard.slice(self.mem)
    }
}

impl fmt::Debug for VectorView<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorView({:?}, {:?})", self.mem, self.deref())
    }
}

/// Read-write access to the values of a [`Vector`], dereferencing to a mutable slice.
pub struct VectorViewMut<'v, 'a> {
    guard: RwLockWriteGuard<'v, VectorStorage<'a>>,
    mem: MemType,
}

impl Deref for VectorViewMut<'_, '_> {
    type Target = [Scalar];

    fn deref(&self) -> &[Scalar] {
        self.guard.slice(self.mem)
    }
}

impl DerefMut for VectorViewMut<'_, '_> {
    fn deref_mut(&mut self) -> &mut [Scalar] {
        self.guard.slice_mut(self.mem)
    }
}

impl fmt::Debug for VectorViewMut<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorViewMut({:?}, {:?})", self.mem, self.deref())
    }
}
