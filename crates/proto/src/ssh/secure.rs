//! Zeroed storage for passphrase material.
//!
//! A [`SecureArray`] copies a secret once into a boxed, fixed-length
//! allocation. It never grows, never clones, and wipes every element before
//! the allocation is freed, whether through [`SecureArray::release`], a normal
//! drop or a drop during unwinding.

use burrow_platform::{BurrowError, BurrowResult};
use secrecy::{ExposeSecret, SecretString};
use zeroize::{DefaultIsZeroes, Zeroize};

/// Fixed-length, explicitly wiped buffer.
///
/// All accessors fail with [`BurrowError::Disposed`] after release.
pub struct SecureArray<T: DefaultIsZeroes> {
    data: Option<Box<[T]>>,
    what: &'static str,
}

/// Byte view of a passphrase.
pub type SecureBuffer = SecureArray<u8>;

/// Character view of a passphrase.
pub type SecureCharBuffer = SecureArray<char>;

impl<T: DefaultIsZeroes> SecureArray<T> {
    fn from_boxed(data: Box<[T]>, what: &'static str) -> Self {
        Self {
            data: Some(data),
            what,
        }
    }

    /// Allocates `len` zero elements.
    pub fn zeroed(len: usize) -> Self {
        Self::from_boxed(vec![T::default(); len].into_boxed_slice(), "SecureArray")
    }

    /// Number of elements.
    pub fn len(&self) -> BurrowResult<usize> {
        Ok(self.storage()?.len())
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> BurrowResult<bool> {
        Ok(self.storage()?.is_empty())
    }

    /// Returns true once [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.data.is_none()
    }

    /// Reads element `index`.
    pub fn get(&self, index: usize) -> BurrowResult<T> {
        let data = self.storage()?;
        data.get(index)
            .copied()
            .ok_or(BurrowError::IndexOutOfRange {
                index,
                len: data.len(),
            })
    }

    /// Overwrites element `index`.
    pub fn set(&mut self, index: usize, value: T) -> BurrowResult<()> {
        let what = self.what;
        let data = self.data.as_deref_mut().ok_or(BurrowError::Disposed(what))?;
        let len = data.len();
        match data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(BurrowError::IndexOutOfRange { index, len }),
        }
    }

    /// Runs `f` over the contents without copying them out.
    pub fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> BurrowResult<R> {
        Ok(f(self.storage()?))
    }

    /// Wipes and frees the storage. Releasing twice is a no-op.
    pub fn release(&mut self) {
        drop(self.wipe());
    }

    fn storage(&self) -> BurrowResult<&[T]> {
        self.data.as_deref().ok_or(BurrowError::Disposed(self.what))
    }

    fn wipe(&mut self) -> Option<Box<[T]>> {
        let mut data = self.data.take()?;
        data[..].zeroize();
        Some(data)
    }
}

impl SecureBuffer {
    /// Copies the UTF-8 bytes of a passphrase.
    pub fn from_secret(secret: &SecretString) -> Self {
        Self::from_bytes(secret.expose_secret().as_bytes())
    }

    /// Copies raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = vec![0u8; bytes.len()].into_boxed_slice();
        data.copy_from_slice(bytes);
        Self::from_boxed(data, "SecureBuffer")
    }

    /// Alias of [`with_slice`](SecureArray::with_slice) for byte buffers.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> BurrowResult<R> {
        self.with_slice(f)
    }
}

impl SecureCharBuffer {
    /// Copies the characters of a passphrase.
    pub fn from_secret(secret: &SecretString) -> Self {
        let text = secret.expose_secret();
        let mut data = vec!['\0'; text.chars().count()].into_boxed_slice();
        for (slot, c) in data.iter_mut().zip(text.chars()) {
            *slot = c;
        }
        Self::from_boxed(data, "SecureCharBuffer")
    }
}

impl<T: DefaultIsZeroes> Drop for SecureArray<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: DefaultIsZeroes> std::fmt::Debug for SecureArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(self.what)
            .field("len", &self.data.as_ref().map(|d| d.len()))
            .finish_non_exhaustive()
    }
}
