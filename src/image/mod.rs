//! Read-only address-space abstraction over runtime-owned metadata.
//!
//! The introspection engine never dereferences raw pointers. Instead, every piece of metadata
//! it looks at is read through an [`crate::image::Image`]: a bounds-checked view of the address
//! range `base .. base + len`, backed either by an owned buffer or by a memory-mapped dump.
//! Type handles, descriptors, field-offset vectors and existential containers are all plain
//! addresses inside that range.
//!
//! # Architecture
//!
//! - **Backend system** - Pluggable data sources ([`crate::image::Backend`]) for in-memory
//!   snapshots and memory-mapped dumps
//! - **Address translation** - Conversion from target addresses to backend offsets with
//!   overflow and underflow checks
//! - **Typed reads** - Little-endian integers, pointer-width words and C strings, all
//!   reporting [`crate::Error::OutOfBounds`] instead of faulting
//! - **Synthesis** - [`crate::image::ImageBuilder`] lays out metadata for tests, benchmarks
//!   and fuzzing
//!
//! # Examples
//!
//! ```rust
//! use metascope::{Image, PointerWidth};
//!
//! let mut data = vec![0u8; 16];
//! data[8] = 0x2A;
//! let image = Image::from_mem(0x1000, data, PointerWidth::Bits64)?;
//!
//! assert_eq!(image.read_word(0x1008)?, 0x2A);
//! assert!(image.read_word(0x1010).is_err());
//! # Ok::<(), metascope::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! [`crate::image::Image`] is `Send + Sync`; all reads are pure.

pub mod builder;
pub mod io;

mod physical;

use std::path::Path;

use strum::{Display, EnumIter};

use crate::{
    image::io::{read_le, ImageIO},
    Error::{Empty, InvalidAddress, OutOfBounds},
    Result,
};
use physical::Physical;

pub use builder::ImageBuilder;

/// Backend trait for image data sources.
///
/// This trait abstracts over the source of the metadata bytes, allowing for both in-memory
/// and on-disk representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// Owned snapshots, such as buffers produced by [`ImageBuilder`]
impl Backend for Vec<u8> {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.get(offset..end))
            .ok_or(OutOfBounds)
    }

    fn data(&self) -> &[u8] {
        self
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Pointer width of the target whose metadata is being inspected.
///
/// Every "word" in the runtime ABI (metadata kind, pointers, field-offset vector entries of
/// classes, tuple element offsets) has this width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum PointerWidth {
    /// 32-bit target, 4-byte words
    Bits32,
    /// 64-bit target, 8-byte words
    Bits64,
}

impl PointerWidth {
    /// Size of a word in bytes
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }

    /// Size of a word in bytes, as an address delta
    #[must_use]
    pub const fn bytes_u64(self) -> u64 {
        self.bytes() as u64
    }

    /// The pointer width of the host running this code
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(target_pointer_width = "32") {
            PointerWidth::Bits32
        } else {
            PointerWidth::Bits64
        }
    }
}

/// A read-only view of a target address range holding runtime metadata.
///
/// # Examples
///
/// ```rust,no_run
/// use metascope::{Image, PointerWidth};
/// use std::path::Path;
///
/// // A dump of the `__swift5_*` and heap regions captured at 0x1_0000_0000
/// let image = Image::from_file(Path::new("metadata.dump"), 0x1_0000_0000, PointerWidth::Bits64)?;
/// println!("{} bytes mapped at 0x{:x}", image.len(), image.base());
/// # Ok::<(), metascope::Error>(())
/// ```
pub struct Image {
    /// The underlying data source (memory or file)
    data: Box<dyn Backend>,
    /// Target address of the first byte of `data`
    base: u64,
    /// Word size of the target
    width: PointerWidth,
}

impl Image {
    /// Maps a dump file into an image starting at `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or if it is empty.
    pub fn from_file(file: &Path, base: u64, width: PointerWidth) -> Result<Image> {
        let input = Physical::new(file)?;

        Self::load(input, base, width)
    }

    /// Wraps an owned buffer into an image starting at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] if the buffer is empty, or
    /// [`crate::Error::InvalidAddress`] if the range would wrap the address space.
    pub fn from_mem(base: u64, data: Vec<u8>, width: PointerWidth) -> Result<Image> {
        Self::load(data, base, width)
    }

    fn load<T: Backend + 'static>(data: T, base: u64, width: PointerWidth) -> Result<Image> {
        if data.len() == 0 {
            return Err(Empty);
        }

        if base.checked_add(data.len() as u64).is_none() {
            return Err(InvalidAddress(base));
        }

        Ok(Image {
            data: Box::new(data),
            base,
            width,
        })
    }

    /// Target address of the first byte of the image
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Target address one past the last byte of the image
    #[must_use]
    pub fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    /// Number of bytes covered by the image
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the image covers no bytes (never the case for a constructed image)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Pointer width of the target
    #[must_use]
    pub fn pointer_width(&self) -> PointerWidth {
        self.width
    }

    /// Size of a target word in bytes
    #[must_use]
    pub fn pointer_size(&self) -> u64 {
        self.width.bytes_u64()
    }

    /// Returns true if `address` lies inside the image
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    /// Translates a target address into an offset within the backend.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAddress`] for addresses below the base and
    /// [`crate::Error::OutOfBounds`] for addresses past the end.
    pub fn address_to_offset(&self, address: u64) -> Result<usize> {
        let Some(offset) = address.checked_sub(self.base) else {
            return Err(InvalidAddress(address));
        };

        if offset > self.data.len() as u64 {
            return Err(OutOfBounds);
        }

        usize::try_from(offset).map_err(|_| OutOfBounds)
    }

    /// Computes `address + delta` without wrapping.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAddress`] if the result under- or overflows.
    pub fn offset_address(&self, address: u64, delta: i64) -> Result<u64> {
        address
            .checked_add_signed(delta)
            .ok_or(InvalidAddress(address))
    }

    /// Computes the address of word `index` relative to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAddress`] if the result under- or overflows.
    pub fn word_address(&self, address: u64, index: i64) -> Result<u64> {
        let delta = index
            .checked_mul(self.width.bytes() as i64)
            .ok_or(InvalidAddress(address))?;
        self.offset_address(address, delta)
    }

    /// Returns `len` bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the range lies outside the image.
    pub fn slice(&self, address: u64, len: usize) -> Result<&[u8]> {
        let offset = self.address_to_offset(address)?;
        self.data.data_slice(offset, len)
    }

    /// Returns every byte from `address` to the end of the image.
    ///
    /// # Errors
    ///
    /// Returns an error if `address` lies outside the image.
    pub fn bytes_from(&self, address: u64) -> Result<&[u8]> {
        let offset = self.address_to_offset(address)?;
        self.data.data_slice(offset, self.data.len() - offset)
    }

    /// Reads a little-endian value of type `T` at `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not fit inside the image.
    pub fn read<T: ImageIO>(&self, address: u64) -> Result<T> {
        read_le(self.slice(address, std::mem::size_of::<T>())?)
    }

    /// Reads a `u8` at `address`
    ///
    /// # Errors
    /// Returns an error if the read leaves the image.
    pub fn read_u8(&self, address: u64) -> Result<u8> {
        self.read::<u8>(address)
    }

    /// Reads a `u16` at `address`
    ///
    /// # Errors
    /// Returns an error if the read leaves the image.
    pub fn read_u16(&self, address: u64) -> Result<u16> {
        self.read::<u16>(address)
    }

    /// Reads a `u32` at `address`
    ///
    /// # Errors
    /// Returns an error if the read leaves the image.
    pub fn read_u32(&self, address: u64) -> Result<u32> {
        self.read::<u32>(address)
    }

    /// Reads an `i32` at `address`
    ///
    /// # Errors
    /// Returns an error if the read leaves the image.
    pub fn read_i32(&self, address: u64) -> Result<i32> {
        self.read::<i32>(address)
    }

    /// Reads a `u64` at `address`
    ///
    /// # Errors
    /// Returns an error if the read leaves the image.
    pub fn read_u64(&self, address: u64) -> Result<u64> {
        self.read::<u64>(address)
    }

    /// Reads an unsigned target word at `address`, zero-extended to `u64`.
    ///
    /// # Errors
    /// Returns an error if the read leaves the image.
    pub fn read_word(&self, address: u64) -> Result<u64> {
        match self.width {
            PointerWidth::Bits32 => Ok(u64::from(self.read::<u32>(address)?)),
            PointerWidth::Bits64 => self.read::<u64>(address),
        }
    }

    /// Reads a signed target word at `address`, sign-extended to `i64`.
    ///
    /// # Errors
    /// Returns an error if the read leaves the image.
    pub fn read_signed_word(&self, address: u64) -> Result<i64> {
        match self.width {
            PointerWidth::Bits32 => Ok(i64::from(self.read::<i32>(address)?)),
            PointerWidth::Bits64 => self.read::<i64>(address),
        }
    }

    /// Reads a pointer at `address`, mapping null to `None`.
    ///
    /// # Errors
    /// Returns an error if the read leaves the image.
    pub fn read_pointer(&self, address: u64) -> Result<Option<u64>> {
        let value = self.read_word(address)?;
        Ok((value != 0).then_some(value))
    }

    /// Returns the NUL-terminated byte string at `address`, without its terminator.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if no terminator exists before the end of the image.
    pub fn c_str(&self, address: u64) -> Result<&[u8]> {
        let bytes = self.bytes_from(address)?;
        match bytes.iter().position(|&b| b == 0) {
            Some(end) => Ok(&bytes[..end]),
            None => Err(OutOfBounds),
        }
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("base", &format_args!("0x{:x}", self.base))
            .field("len", &self.data.len())
            .field("width", &self.width)
            .finish()
    }
}
