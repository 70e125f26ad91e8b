//! Value-witness tables.
//!
//! Every metadata block is preceded by a pointer to the type's value-witness table. The table
//! starts with eight function pointers (copy, destroy, assign, ...) which this crate never
//! calls, followed by the layout summary used throughout the walkers:
//!
//! ```text
//!  vwt + 8W       : size
//!  vwt + 9W       : stride
//!  vwt + 10W      : flags (u32)
//!  vwt + 10W + 4  : extra inhabitant count (u32)
//! ```

use bitflags::bitflags;

use crate::{metadata::TypeHandle, Image, Result};

/// Number of witness function pointers preceding the layout summary
pub const VALUE_WITNESS_FUNCTION_COUNT: u64 = 8;

bitflags! {
    /// Flags stored in the layout summary of a value-witness table
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ValueWitnessFlags: u32 {
        /// Alignment of the type, minus one
        const ALIGNMENT_MASK = 0x0000_00FF;
        /// Copying requires more than a bitwise copy
        const IS_NON_POD = 0x0001_0000;
        /// Values do not fit into an existential's inline buffer
        const IS_NON_INLINE = 0x0002_0000;
        /// The type has spare bits usable by enclosing enums
        const HAS_SPARE_BITS = 0x0008_0000;
        /// Moving a value requires more than a bitwise copy
        const IS_NON_BITWISE_TAKABLE = 0x0010_0000;
        /// The table is followed by enum witnesses
        const HAS_ENUM_WITNESSES = 0x0020_0000;
        /// The layout has not been computed yet
        const INCOMPLETE = 0x0040_0000;
    }
}

/// Layout summary of a type, read from its value-witness table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueWitness {
    /// Address of the table
    pub address: u64,
    /// Size of a value in bytes
    pub size: u64,
    /// Distance between consecutive array elements
    pub stride: u64,
    /// Layout flags
    pub flags: ValueWitnessFlags,
    /// Number of invalid bit patterns usable as enum tags
    pub extra_inhabitant_count: u32,
}

impl ValueWitness {
    /// Reads the witness table of the metadata at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for a null table pointer, or an access error if the
    /// table lies outside the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Self> {
        let slot = image.word_address(handle.address(), -1)?;
        let Some(address) = image.read_pointer(slot)? else {
            return Err(malformed_error!(
                "Type {} has no value witness table",
                handle
            ));
        };

        let summary = image.word_address(address, VALUE_WITNESS_FUNCTION_COUNT as i64)?;
        let word = image.pointer_size();

        Ok(ValueWitness {
            address,
            size: image.read_word(summary)?,
            stride: image.read_word(summary + word)?,
            flags: ValueWitnessFlags::from_bits_retain(image.read_u32(summary + 2 * word)?),
            extra_inhabitant_count: image.read_u32(summary + 2 * word + 4)?,
        })
    }

    /// Alignment mask (alignment minus one)
    #[must_use]
    pub fn alignment_mask(&self) -> u64 {
        u64::from(self.flags.bits() & ValueWitnessFlags::ALIGNMENT_MASK.bits())
    }

    /// Alignment in bytes
    #[must_use]
    pub fn alignment(&self) -> u64 {
        self.alignment_mask() + 1
    }

    /// True if values can be copied bitwise
    #[must_use]
    pub fn is_pod(&self) -> bool {
        !self.flags.contains(ValueWitnessFlags::IS_NON_POD)
    }

    /// True if values fit into an existential's three-word inline buffer
    #[must_use]
    pub fn is_inline(&self) -> bool {
        !self.flags.contains(ValueWitnessFlags::IS_NON_INLINE)
    }

    /// True if values can be moved bitwise
    #[must_use]
    pub fn is_bitwise_takable(&self) -> bool {
        !self
            .flags
            .contains(ValueWitnessFlags::IS_NON_BITWISE_TAKABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::layout::LayoutBuilder;
    use crate::PointerWidth;

    #[test]
    fn read_summary() {
        for width in [PointerWidth::Bits64, PointerWidth::Bits32] {
            let mut layout = LayoutBuilder::new(width);
            let int = layout.builtin_int();
            let wide = layout.opaque_type(24, 7, ValueWitnessFlags::IS_NON_INLINE.bits());
            let image = layout.build();

            let vw = ValueWitness::read(&image, int).unwrap();
            assert_eq!(vw.size, width.bytes_u64());
            assert_eq!(vw.stride, width.bytes_u64());
            assert_eq!(vw.alignment(), width.bytes_u64());
            assert!(vw.is_pod());
            assert!(vw.is_inline());
            assert!(vw.is_bitwise_takable());

            let vw = ValueWitness::read(&image, wide).unwrap();
            assert_eq!(vw.size, 24);
            assert_eq!(vw.alignment_mask(), 7);
            assert!(!vw.is_inline());
        }
    }

    #[test]
    fn null_table() {
        let mut builder = crate::ImageBuilder::new(0x1000, PointerWidth::Bits64);
        let block = builder.alloc_words(2);
        let image = builder.build().unwrap();

        let handle = TypeHandle::new(block + 8);
        assert!(matches!(
            ValueWitness::read(&image, handle),
            Err(crate::Error::Malformed { .. })
        ));
    }
}
