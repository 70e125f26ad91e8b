//! Class metadata.
//!
//! Every class object starts with the fields the foreign object system requires (isa,
//! superclass, two cache words and a data word). Native classes set one of the two low bits
//! of the data word and continue with the native layout:
//!
//! ```text
//!  handle + W        superclass          handle + 4W       data (low bits: native)
//!  handle + 5W       flags (u32)         + 4               instance address point (u32)
//!  + 8               instance size       + 12              instance align mask (u16)
//!  + 16              class size (u32)    + 20              class address point (u32)
//!  + 24              descriptor          + 24 + W          ivar destroyer
//! ```
//!
//! The field offset vector holds one word per stored property declared by the class itself,
//! at a position recorded in (or derived from) the class descriptor.

use bitflags::bitflags;

use crate::{
    metadata::{
        descriptor::{ClassDescriptor, ContextDescriptor},
        TypeHandle,
    },
    Image, Result,
};

bitflags! {
    /// Flags of native class metadata
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u32 {
        /// Compiled against a pre-stable ABI
        const IS_SWIFT_PRE_STABLE_ABI = 0x1;
        /// Instances use native reference counting
        const USES_SWIFT_REFCOUNTING = 0x2;
        /// The class has a custom foreign runtime name
        const HAS_CUSTOM_OBJC_NAME = 0x4;
    }
}

/// View over the part of class metadata shared with the foreign object system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnyClassMetadata {
    /// Metadata handle
    pub handle: TypeHandle,
    /// Superclass, if any
    pub superclass: Option<TypeHandle>,
    /// Data word; one of the low two bits is set for native classes
    pub data: u64,
}

impl AnyClassMetadata {
    /// Reads the class header at `handle`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the header is not contained in the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Self> {
        let base = handle.address();
        Ok(AnyClassMetadata {
            handle,
            superclass: TypeHandle::from_pointer(image.read_pointer(image.word_address(base, 1)?)?),
            data: image.read_word(image.word_address(base, 4)?)?,
        })
    }

    /// True for classes with native metadata
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.data & 3 != 0
    }

    /// Reads the native layout, or `None` for purely foreign classes.
    ///
    /// # Errors
    ///
    /// Returns an access error if the native fields are not contained in the image.
    pub fn native(&self, image: &Image) -> Result<Option<ClassMetadata>> {
        if !self.is_native() {
            return Ok(None);
        }

        let base = image.word_address(self.handle.address(), 5)?;
        let word = image.pointer_size();
        let descriptor = base + 24;

        Ok(Some(ClassMetadata {
            header: *self,
            flags: ClassFlags::from_bits_retain(image.read_u32(base)?),
            instance_address_point: image.read_u32(base + 4)?,
            instance_size: image.read_u32(base + 8)?,
            instance_align_mask: image.read_u16(base + 12)?,
            class_size: image.read_u32(base + 16)?,
            class_address_point: image.read_u32(base + 20)?,
            descriptor: image.read_pointer(descriptor)?,
            ivar_destroyer: image.read_pointer(descriptor + word)?,
        }))
    }
}

/// View over native class metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassMetadata {
    /// Shared header
    pub header: AnyClassMetadata,
    /// Class flags
    pub flags: ClassFlags,
    /// Offset of the instance address point
    pub instance_address_point: u32,
    /// Size of an instance
    pub instance_size: u32,
    /// Alignment mask of an instance
    pub instance_align_mask: u16,
    /// Total size of the class object
    pub class_size: u32,
    /// Offset of the class address point within the class object
    pub class_address_point: u32,
    /// Class descriptor
    pub descriptor: Option<u64>,
    /// Destroyer for partially initialised instances
    pub ivar_destroyer: Option<u64>,
}

impl ClassMetadata {
    /// Metadata handle
    #[must_use]
    pub fn handle(&self) -> TypeHandle {
        self.header.handle
    }

    /// True if instances use native reference counting
    #[must_use]
    pub fn uses_swift_refcounting(&self) -> bool {
        self.flags.contains(ClassFlags::USES_SWIFT_REFCOUNTING)
    }

    /// Decodes the class descriptor.
    ///
    /// Returns `Ok(None)` if the descriptor pointer is null.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is not a class descriptor.
    pub fn class_descriptor(&self, image: &Image) -> Result<Option<ClassDescriptor>> {
        let Some(address) = self.descriptor else {
            return Ok(None);
        };

        match ContextDescriptor::read(image, address)? {
            ContextDescriptor::Class(descriptor) => Ok(Some(descriptor)),
            other => Err(malformed_error!(
                "Class {} points at a {:?} descriptor",
                self.handle(),
                other.header().kind()
            )),
        }
    }

    /// Reads entry `index` of the field offset vector located `fovo` words into the metadata.
    ///
    /// # Errors
    ///
    /// Returns an access error if the entry is not contained in the image.
    pub fn field_offset(&self, image: &Image, fovo: i64, index: u32) -> Result<u64> {
        let slot = fovo
            .checked_add(i64::from(index))
            .ok_or(crate::Error::InvalidAddress(self.handle().address()))?;
        image.read_word(image.word_address(self.handle().address(), slot)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::layout::{ClassSpec, LayoutBuilder};
    use crate::PointerWidth;

    #[test]
    fn native_layout() {
        for width in [PointerWidth::Bits64, PointerWidth::Bits32] {
            let mut layout = LayoutBuilder::new(width);
            layout.builtin_int();
            let class = layout.class(ClassSpec::new("Base").field("a", "Si"));
            let image = layout.build();

            let header = AnyClassMetadata::read(&image, class).unwrap();
            assert!(header.is_native());
            assert_eq!(header.superclass, None);

            let native = header.native(&image).unwrap().unwrap();
            assert!(native.uses_swift_refcounting());
            let descriptor = native.class_descriptor(&image).unwrap().unwrap();
            assert_eq!(descriptor.num_fields, 1);

            let fovo = descriptor.field_offset_vector_words(&image).unwrap().unwrap();
            assert_eq!(
                native.field_offset(&image, fovo, 0).unwrap(),
                2 * width.bytes_u64()
            );
        }
    }

    #[test]
    fn foreign_class() {
        let mut layout = LayoutBuilder::new(PointerWidth::Bits64);
        let foreign = layout.foreign_class(None);
        let image = layout.build();

        let header = AnyClassMetadata::read(&image, foreign).unwrap();
        assert!(!header.is_native());
        assert_eq!(header.native(&image).unwrap(), None);
    }
}
