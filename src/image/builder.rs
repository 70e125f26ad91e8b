//! Synthesis of metadata images.
//!
//! [`crate::image::ImageBuilder`] lays out runtime metadata byte-for-byte in a growing buffer
//! and freezes it into an [`crate::image::Image`]. It is the tool used by the test suite, the
//! benchmarks and the fuzz target to produce struct, class, enum and capture layouts without a
//! live runtime.
//!
//! Blocks are allocated with [`crate::image::ImageBuilder::alloc`] and filled in afterwards, so
//! structures that reference each other (a class and its superclass, a descriptor and its field
//! records) can be allocated first and patched once all addresses are known.
//!
//! # Examples
//!
//! ```rust
//! use metascope::{ImageBuilder, PointerWidth};
//!
//! let mut builder = ImageBuilder::new(0x10_0000, PointerWidth::Bits64);
//! let name = builder.alloc_c_str(b"Si");
//! let slot = builder.alloc(4, 4);
//! builder.write_relative(slot, Some(name))?;
//!
//! let image = builder.build()?;
//! assert_eq!(image.read_i32(slot)?, (name as i64 - slot as i64) as i32);
//! # Ok::<(), metascope::Error>(())
//! ```

use crate::{
    image::{
        io::{write_le_at, ImageIO},
        Image, PointerWidth,
    },
    utils::align_up,
    Error::InvalidAddress,
    Result,
};

/// Incrementally builds an [`Image`] at a fixed base address.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    base: u64,
    width: PointerWidth,
    data: Vec<u8>,
}

impl ImageBuilder {
    /// Creates an empty builder whose first byte will live at `base`
    #[must_use]
    pub fn new(base: u64, width: PointerWidth) -> Self {
        ImageBuilder {
            base,
            width,
            data: Vec::new(),
        }
    }

    /// Pointer width of the image being built
    #[must_use]
    pub fn pointer_width(&self) -> PointerWidth {
        self.width
    }

    /// Size of a target word in bytes
    #[must_use]
    pub fn pointer_size(&self) -> u64 {
        self.width.bytes_u64()
    }

    /// Address of the next byte that would be allocated
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    /// Allocates `size` zeroed bytes aligned to `align` and returns their address.
    ///
    /// `align` must be a power of two; zero is treated as one.
    pub fn alloc(&mut self, size: usize, align: usize) -> u64 {
        let mask = align.max(1) as u64 - 1;
        let start = align_up(self.cursor(), mask);
        let padded = (start - self.base) as usize + size;
        self.data.resize(padded, 0);
        start
    }

    /// Allocates `count` zeroed target words and returns the address of the first one
    pub fn alloc_words(&mut self, count: usize) -> u64 {
        let size = self.width.bytes();
        self.alloc(count * size, size)
    }

    /// Copies `bytes` into a fresh unaligned block and returns its address
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> u64 {
        let address = self.alloc(bytes.len(), 1);
        let offset = (address - self.base) as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        address
    }

    /// Copies `bytes` plus a NUL terminator into a fresh block and returns its address
    pub fn alloc_c_str(&mut self, bytes: &[u8]) -> u64 {
        let address = self.alloc_bytes(bytes);
        self.alloc_bytes(&[0]);
        address
    }

    fn offset_of(&self, address: u64) -> Result<usize> {
        let Some(offset) = address.checked_sub(self.base) else {
            return Err(InvalidAddress(address));
        };
        usize::try_from(offset).map_err(|_| InvalidAddress(address))
    }

    /// Writes a little-endian value at `address`, which must already be allocated.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not fit inside the allocated bytes.
    pub fn write<T: ImageIO>(&mut self, address: u64, value: T) -> Result<()> {
        let mut offset = self.offset_of(address)?;
        write_le_at(&mut self.data, &mut offset, value)
    }

    /// Writes a `u8` at `address`
    ///
    /// # Errors
    /// Returns an error if the address is not allocated.
    pub fn write_u8(&mut self, address: u64, value: u8) -> Result<()> {
        self.write(address, value)
    }

    /// Writes a `u16` at `address`
    ///
    /// # Errors
    /// Returns an error if the address is not allocated.
    pub fn write_u16(&mut self, address: u64, value: u16) -> Result<()> {
        self.write(address, value)
    }

    /// Writes a `u32` at `address`
    ///
    /// # Errors
    /// Returns an error if the address is not allocated.
    pub fn write_u32(&mut self, address: u64, value: u32) -> Result<()> {
        self.write(address, value)
    }

    /// Writes an `i32` at `address`
    ///
    /// # Errors
    /// Returns an error if the address is not allocated.
    pub fn write_i32(&mut self, address: u64, value: i32) -> Result<()> {
        self.write(address, value)
    }

    /// Writes a target word at `address`, truncating to 32 bits on 32-bit targets.
    ///
    /// # Errors
    /// Returns an error if the address is not allocated, or if `value` does not fit a
    /// 32-bit word.
    pub fn write_word(&mut self, address: u64, value: u64) -> Result<()> {
        match self.width {
            PointerWidth::Bits32 => {
                let narrow = u32::try_from(value)
                    .map_err(|_| malformed_error!("0x{:x} does not fit a 32-bit word", value))?;
                self.write(address, narrow)
            }
            PointerWidth::Bits64 => self.write(address, value),
        }
    }

    /// Writes a signed target word at `address`.
    ///
    /// # Errors
    /// Returns an error if the address is not allocated or the value does not fit.
    pub fn write_signed_word(&mut self, address: u64, value: i64) -> Result<()> {
        match self.width {
            PointerWidth::Bits32 => {
                let narrow = i32::try_from(value)
                    .map_err(|_| malformed_error!("{} does not fit a 32-bit word", value))?;
                self.write(address, narrow)
            }
            PointerWidth::Bits64 => self.write(address, value),
        }
    }

    /// Writes word `index` of the word array starting at `address`.
    ///
    /// # Errors
    /// Returns an error if the slot is not allocated.
    pub fn write_word_at(&mut self, address: u64, index: usize, value: u64) -> Result<()> {
        self.write_word(address + index as u64 * self.pointer_size(), value)
    }

    /// Stores a direct relative reference at `field` pointing to `target`, or the absent
    /// marker (zero) for `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the distance does not fit 32 bits, or if it is odd (which would
    /// read back as an indirect reference).
    pub fn write_relative(&mut self, field: u64, target: Option<u64>) -> Result<()> {
        let Some(target) = target else {
            return self.write_i32(field, 0);
        };

        let distance = relative_distance(field, target)?;
        if distance == 0 {
            return Err(malformed_error!(
                "relative reference at 0x{:x} cannot point at itself",
                field
            ));
        }

        self.write_i32(field, distance)
    }

    /// Stores a direct relative reference to a string, where odd distances are legal
    /// because string references are never indirect.
    ///
    /// # Errors
    ///
    /// Returns an error if the distance does not fit 32 bits.
    pub fn write_relative_str(&mut self, field: u64, target: Option<u64>) -> Result<()> {
        let distance = match target {
            Some(target) => relative_distance_any(field, target)?,
            None => 0,
        };
        self.write_i32(field, distance)
    }

    /// Stores an indirect relative reference at `field`: the target address is placed in a
    /// freshly allocated word and `field` points at that word with the indirection bit set.
    ///
    /// # Errors
    ///
    /// Returns an error if the distance does not fit 32 bits.
    pub fn write_indirect_relative(&mut self, field: u64, target: u64) -> Result<()> {
        let slot = self.alloc_words(1);
        self.write_word(slot, target)?;

        let distance = relative_distance_any(field, slot)?;
        self.write_i32(field, distance | 1)
    }

    /// Freezes the builder into an image.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] if nothing was allocated.
    pub fn build(self) -> Result<Image> {
        Image::from_mem(self.base, self.data, self.width)
    }
}

fn relative_distance_any(field: u64, target: u64) -> Result<i32> {
    let distance = i128::from(target) - i128::from(field);
    i32::try_from(distance).map_err(|_| {
        malformed_error!(
            "0x{:x} is out of relative reach of 0x{:x}",
            target,
            field
        )
    })
}

fn relative_distance(field: u64, target: u64) -> Result<i32> {
    let distance = relative_distance_any(field, target)?;
    if distance & 1 != 0 {
        return Err(malformed_error!(
            "direct relative reference at 0x{:x} needs an even distance",
            field
        ));
    }
    Ok(distance)
}
