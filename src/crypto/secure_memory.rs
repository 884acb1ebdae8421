//! Secure memory handling for sensitive data
//!
//! [`SecretBuffer`] is a fixed-capacity byte region for raw config bytes and
//! other secrets. It is only used through [`SecretBuffer::scoped`], which
//! releases the buffer on every exit path of the closure, and release
//! overwrites the full capacity with random bytes [`WIPE_PASSES`] times.
//!
//! [`SecureString`] holds passwords for the lifetime of a [`Config`] and is
//! zeroed when dropped.
//!
//! [`Config`]: crate::config::Config

use std::fmt;
use std::io::{self, Read, Write};
use std::ops::Deref;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of random overwrite passes performed on release
pub const WIPE_PASSES: usize = 16;

/// Source of the garbage written over a secret region on release
pub trait Scrubber {
    /// Overwrite every byte of `region` once
    fn scrub(&mut self, region: &mut [u8]);
}

/// Scrubber backed by the operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsScrubber;

impl Scrubber for OsScrubber {
    fn scrub(&mut self, region: &mut [u8]) {
        if OsRng.try_fill_bytes(region).is_err() {
            rand::thread_rng().fill_bytes(region);
        }
    }
}

/// A fixed-capacity byte buffer for secret material
///
/// The buffer never grows. Writes past capacity fail with
/// [`io::ErrorKind::WriteZero`] and reads stop at capacity.
pub struct SecretBuffer {
    region: Box<[u8]>,
    len: usize,
    released: bool,
}

impl SecretBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes
    fn acquire(capacity: usize) -> Self {
        Self {
            region: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            released: false,
        }
    }

    /// Run `f` with a freshly acquired buffer and release it afterwards
    ///
    /// Release happens whether `f` returns `Ok` or `Err`.
    pub fn scoped<T, E>(
        capacity: usize,
        f: impl FnOnce(&mut SecretBuffer) -> Result<T, E>,
    ) -> Result<T, E> {
        Self::scoped_with(capacity, &mut OsScrubber, f)
    }

    /// Like [`scoped`](Self::scoped) but releases through the given scrubber
    pub fn scoped_with<S, T, E>(
        capacity: usize,
        scrubber: &mut S,
        f: impl FnOnce(&mut SecretBuffer) -> Result<T, E>,
    ) -> Result<T, E>
    where
        S: Scrubber,
    {
        let mut buffer = Self::acquire(capacity);
        let result = f(&mut buffer);
        buffer.release_with(scrubber);
        result
    }

    /// Total number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Number of bytes currently in use
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no bytes are in use
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bytes currently in use
    pub fn as_bytes(&self) -> &[u8] {
        &self.region[..self.len]
    }

    /// Fill the buffer from `reader` until end of input
    ///
    /// Fails with [`io::ErrorKind::InvalidData`] if the input does not fit.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        loop {
            if self.len == self.capacity() {
                let mut probe = [0u8; 1];
                let extra = reader.read(&mut probe)?;
                probe.zeroize();
                if extra == 0 {
                    return Ok(self.len);
                }
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("input exceeds {} byte secret buffer", self.capacity()),
                ));
            }

            match reader.read(&mut self.region[self.len..]) {
                Ok(0) => return Ok(self.len),
                Ok(n) => self.len += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Overwrite the whole capacity and give the memory back
    ///
    /// Returns the number of overwrite passes performed.
    pub fn release_with<S: Scrubber>(mut self, scrubber: &mut S) -> usize {
        let passes = self.wipe(scrubber);
        self.released = true;
        passes
    }

    fn wipe<S: Scrubber>(&mut self, scrubber: &mut S) -> usize {
        for _ in 0..WIPE_PASSES {
            scrubber.scrub(&mut self.region);
        }
        self.len = 0;
        WIPE_PASSES
    }
}

impl Write for SecretBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.capacity() - self.len;
        if room == 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("secret buffer full at {} bytes", self.capacity()),
            ));
        }
        let n = room.min(buf.len());
        self.region[self.len..self.len + n].copy_from_slice(&buf[..n]);
        self.len += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// A buffer only reaches here unreleased when the scope unwinds.
impl Drop for SecretBuffer {
    fn drop(&mut self) {
        if !self.released {
            self.wipe(&mut OsScrubber);
        }
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .finish()
    }
}

/// A string type that zeros its contents on drop
///
/// Use this for passwords and other sensitive string data.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Create a new SecureString
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    /// Get the string contents
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Get the length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Clone for SecureString {
    fn clone(&self) -> Self {
        Self::new(self.inner.as_str())
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for SecureString {}

impl Deref for SecureString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Don't print the contents in Debug output
impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("len", &self.inner.len())
            .finish()
    }
}

// Don't print the contents in Display output
impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED {} bytes]", self.inner.len())
    }
}
