//! Encoded type names.
//!
//! Field records refer to their types through compact encoded names that mix printable
//! characters with embedded binary *symbolic references*. A control byte in `0x01..=0x17`
//! introduces a 4-byte relative reference to a context descriptor; a byte in `0x18..=0x1F`
//! introduces a pointer-sized absolute reference. The name ends at the first `0x00` that is not
//! part of such a payload, so a plain `strlen` would cut names short and
//! [`crate::metadata::typename::scan_length`] must be used instead.
//!
//! Weak and unowned references are not distinct metadata kinds. Their ownership is recorded
//! as a two-byte suffix on the name (`Xw`, `Xo`, `Xu`) and recovered by
//! [`crate::metadata::typename::Ownership::from_encoded_name`].
//!
//! # Examples
//!
//! ```rust
//! use metascope::metadata::typename::{scan_length, Ownership};
//!
//! let name = b"Si\x01\x00\x00\x00\x00Xw\x00";
//! let len = scan_length(name, 8)?;
//! assert_eq!(len, 9);
//! assert_eq!(Ownership::from_encoded_name(&name[..len]), Ownership::Weak);
//! # Ok::<(), metascope::Error>(())
//! ```

use std::ops::RangeInclusive;

use strum::{Display, EnumIter};

use crate::{Error::OutOfBounds, Image, Result};

/// Control bytes followed by a 4-byte relative reference
pub const SYMBOLIC_RELATIVE: RangeInclusive<u8> = 0x01..=0x17;
/// Control bytes followed by a pointer-sized absolute reference
pub const SYMBOLIC_ABSOLUTE: RangeInclusive<u8> = 0x18..=0x1F;

/// Returns the length of the encoded name at the start of `bytes`, excluding the terminator.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the name or one of its embedded references runs
/// past the end of `bytes`.
pub fn scan_length(bytes: &[u8], pointer_size: usize) -> Result<usize> {
    let mut pos = 0;
    loop {
        let Some(&c) = bytes.get(pos) else {
            return Err(OutOfBounds);
        };

        pos += if c == 0 {
            return Ok(pos);
        } else if SYMBOLIC_RELATIVE.contains(&c) {
            1 + 4
        } else if SYMBOLIC_ABSOLUTE.contains(&c) {
            1 + pointer_size
        } else {
            1
        };
    }
}

/// Reads the encoded name at `address`, without its terminator.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the name is not terminated inside the image.
pub fn read_encoded_name(image: &Image, address: u64) -> Result<&[u8]> {
    let bytes = image.bytes_from(address)?;
    let len = scan_length(bytes, image.pointer_width().bytes())?;
    Ok(&bytes[..len])
}

/// Reference ownership of a stored property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
pub enum Ownership {
    /// Ordinary strong reference
    #[default]
    Strong,
    /// Zeroing weak reference
    Weak,
    /// Unowned reference with safety checks
    Unowned,
    /// Unowned reference without safety checks
    UnownedUnsafe,
}

impl Ownership {
    /// Decodes the ownership suffix of an encoded name (without terminator).
    ///
    /// Only names longer than two bytes can carry a suffix, so `"Xw"` on its own is a strong
    /// reference to a type called `Xw`.
    #[must_use]
    pub fn from_encoded_name(name: &[u8]) -> Self {
        if name.len() <= 2 || name[name.len() - 2] != b'X' {
            return Ownership::Strong;
        }

        match name[name.len() - 1] {
            b'w' => Ownership::Weak,
            b'o' => Ownership::Unowned,
            b'u' => Ownership::UnownedUnsafe,
            _ => Ownership::Strong,
        }
    }

    /// True for [`Ownership::Strong`]
    #[must_use]
    pub fn is_strong(self) -> bool {
        self == Ownership::Strong
    }
}
