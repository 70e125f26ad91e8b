//! Self-relative references.
//!
//! Statically emitted metadata avoids absolute pointers (and thus load-time relocations) by
//! storing a signed 32-bit distance from the field's own address to its target. Two encodings
//! exist:
//!
//! - **Direct** - `target = field + offset`. Used for names and encoded type references, whose
//!   targets are byte-aligned, so every offset value is a legitimate distance.
//! - **Indirectable** - targets are at least 2-byte aligned, so the low bit is free to act as a
//!   tag. When set, `field + (offset & !1)` is the address of a pointer-sized slot that holds
//!   the real target, which lets a descriptor refer to a symbol bound late by the loader.
//!
//! In both encodings an offset of zero means *absent*: a field cannot usefully point at itself.
//!
//! # Examples
//!
//! ```rust
//! use metascope::metadata::relative::{is_absent, is_indirect, resolve};
//!
//! assert!(is_absent(0));
//! assert!(is_indirect(0x11));
//! assert_eq!(resolve(0x1000, -0x10)?, Some(0xFF0));
//! assert_eq!(resolve(0x1000, 0)?, None);
//! # Ok::<(), metascope::Error>(())
//! ```

use crate::{Error::InvalidAddress, Image, Result};

/// True if `offset` marks an absent reference
#[must_use]
pub const fn is_absent(offset: i32) -> bool {
    offset == 0
}

/// True if `offset` (of an indirectable reference) goes through a pointer slot
#[must_use]
pub const fn is_indirect(offset: i32) -> bool {
    offset & 1 == 1
}

/// Resolves a direct reference stored at `base` with value `offset`.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidAddress`] if the target would wrap the address space.
pub fn resolve(base: u64, offset: i32) -> Result<Option<u64>> {
    if is_absent(offset) {
        return Ok(None);
    }

    base.checked_add_signed(i64::from(offset))
        .map(Some)
        .ok_or(InvalidAddress(base))
}

/// Resolves an indirectable reference stored at `base` with value `offset`.
///
/// Indirect references read their target from the slot they point at; a null slot resolves to
/// `None` just like an absent reference.
///
/// # Errors
///
/// Returns an error if the slot lies outside the image or the target would wrap.
pub fn resolve_indirectable(image: &Image, base: u64, offset: i32) -> Result<Option<u64>> {
    if !is_indirect(offset) {
        return resolve(base, offset);
    }

    match resolve(base, offset & !1)? {
        Some(slot) => image.read_pointer(slot),
        // `offset == 1`: a slot at the field itself
        None => image.read_pointer(base),
    }
}

/// Reads the direct reference stored at `field` and resolves it.
///
/// # Errors
///
/// Returns an error if the field lies outside the image.
pub fn read_relative(image: &Image, field: u64) -> Result<Option<u64>> {
    resolve(field, image.read_i32(field)?)
}

/// Reads the indirectable reference stored at `field` and resolves it.
///
/// # Errors
///
/// Returns an error if the field or its slot lies outside the image.
pub fn read_relative_indirectable(image: &Image, field: u64) -> Result<Option<u64>> {
    resolve_indirectable(image, field, image.read_i32(field)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageBuilder, PointerWidth};

    #[test]
    fn predicates() {
        assert!(is_absent(0));
        assert!(!is_absent(4));
        assert!(is_indirect(1));
        assert!(is_indirect(-7));
        assert!(!is_indirect(-8));
        assert!(!is_indirect(0));
    }

    #[test]
    fn resolve_direct() {
        assert_eq!(resolve(0x2000, 0x20).unwrap(), Some(0x2020));
        assert_eq!(resolve(0x2000, -0x20).unwrap(), Some(0x1FE0));
        // direct references may be odd
        assert_eq!(resolve(0x2000, 3).unwrap(), Some(0x2003));
        assert_eq!(resolve(0x2000, 0).unwrap(), None);
        assert!(resolve(0x10, -0x20).is_err());
    }

    #[test]
    fn resolve_through_slot() {
        let mut builder = ImageBuilder::new(0x1000, PointerWidth::Bits64);
        let direct = builder.alloc(4, 4);
        let indirect = builder.alloc(4, 4);
        let null_slot = builder.alloc(4, 4);
        let target = builder.alloc(8, 8);
        builder.write_relative(direct, Some(target)).unwrap();
        builder.write_indirect_relative(indirect, target).unwrap();
        builder.write_indirect_relative(null_slot, 0).unwrap();
        let image = builder.build().unwrap();

        assert_eq!(
            read_relative_indirectable(&image, direct).unwrap(),
            Some(target)
        );
        assert_eq!(
            read_relative_indirectable(&image, indirect).unwrap(),
            Some(target)
        );
        assert_eq!(read_relative_indirectable(&image, null_slot).unwrap(), None);
        // read as a direct reference the tag bit is part of the distance
        assert_ne!(read_relative(&image, indirect).unwrap(), Some(target));
    }

    #[test]
    fn slot_outside_image() {
        let mut builder = ImageBuilder::new(0x1000, PointerWidth::Bits64);
        let field = builder.alloc(4, 4);
        builder.write_i32(field, 0x1001).unwrap();
        let image = builder.build().unwrap();

        assert!(read_relative_indirectable(&image, field).is_err());
    }
}
