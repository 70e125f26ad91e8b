//! Existential metadata and container projection.
//!
//! An existential value is stored in one of two container shapes, chosen by the constraints
//! of the protocol composition:
//!
//! ```text
//!  class constrained   0 : object pointer        W.. : witness tables
//!  opaque              0 : inline buffer (3W)   3W  : dynamic type   4W.. : witness tables
//! ```
//!
//! An opaque container stores small values inline. Values that do not fit are boxed: the
//! first buffer word points at a heap box whose payload follows a two-word header, padded to
//! the value's alignment. Compositions involving special protocols (such as the error
//! protocol) use runtime-specific representations that are not projected.

use strum::{Display, EnumIter};

use crate::{
    metadata::{class::AnyClassMetadata, valuewitness::ValueWitness, TypeHandle},
    runtime::Runtime,
    utils::align_up,
    Image, Result,
};

/// Mask selecting the number of witness tables
pub const EXISTENTIAL_NUM_WITNESS_TABLES_MASK: u32 = 0x00FF_FFFF;
/// Set when the composition is not class constrained
pub const EXISTENTIAL_NON_CLASS_CONSTRAINT: u32 = 0x8000_0000;
/// Set when the composition has a superclass constraint
pub const EXISTENTIAL_HAS_SUPERCLASS: u32 = 0x4000_0000;
/// Mask selecting the special protocol
pub const EXISTENTIAL_SPECIAL_PROTOCOL_MASK: u32 = 0x3F00_0000;
/// Shift of the special protocol
pub const EXISTENTIAL_SPECIAL_PROTOCOL_SHIFT: u32 = 24;

/// Words in the inline buffer of an opaque container
pub const OPAQUE_BUFFER_WORDS: u64 = 3;

/// How values of an existential type are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ExistentialRepresentation {
    /// Inline buffer plus dynamic type
    Opaque,
    /// Single object pointer
    Class,
    /// Special protocol representation, not projected
    Unsupported,
}

/// View over existential type metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistentialMetadata {
    /// Metadata handle
    pub handle: TypeHandle,
    /// Raw flags
    pub flags: u32,
    /// Number of protocols in the composition
    pub num_protocols: u32,
}

impl ExistentialMetadata {
    /// Reads the existential metadata at `handle`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the header is not contained in the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Self> {
        let flags = image.word_address(handle.address(), 1)?;
        Ok(ExistentialMetadata {
            handle,
            flags: image.read_u32(flags)?,
            num_protocols: image.read_u32(flags + 4)?,
        })
    }

    /// Number of witness tables stored in each container
    #[must_use]
    pub fn num_witness_tables(&self) -> u32 {
        self.flags & EXISTENTIAL_NUM_WITNESS_TABLES_MASK
    }

    /// Special protocol index, zero if none
    #[must_use]
    pub fn special_protocol(&self) -> u32 {
        (self.flags & EXISTENTIAL_SPECIAL_PROTOCOL_MASK) >> EXISTENTIAL_SPECIAL_PROTOCOL_SHIFT
    }

    /// True if the composition has a superclass constraint
    #[must_use]
    pub fn has_superclass(&self) -> bool {
        self.flags & EXISTENTIAL_HAS_SUPERCLASS != 0
    }

    /// Container representation
    #[must_use]
    pub fn representation(&self) -> ExistentialRepresentation {
        if self.special_protocol() != 0 {
            ExistentialRepresentation::Unsupported
        } else if self.flags & EXISTENTIAL_NON_CLASS_CONSTRAINT == 0 {
            ExistentialRepresentation::Class
        } else {
            ExistentialRepresentation::Opaque
        }
    }

    /// True for class-constrained containers
    #[must_use]
    pub fn is_class_bound(&self) -> bool {
        self.representation() == ExistentialRepresentation::Class
    }

    /// Address of the value held by the container at `container`.
    ///
    /// For class-constrained containers this is the address of the object pointer slot, not
    /// the object itself. Returns `Ok(None)` for unsupported representations.
    ///
    /// # Errors
    ///
    /// Returns an error if the container or the dynamic type's witness table is unreadable,
    /// or if an out-of-line container has a null box pointer.
    pub fn project_value(&self, image: &Image, container: u64) -> Result<Option<u64>> {
        match self.representation() {
            ExistentialRepresentation::Class => Ok(Some(container)),
            ExistentialRepresentation::Opaque => {
                let Some(ty) = self.opaque_type(image, container)? else {
                    return Err(malformed_error!(
                        "Opaque container at 0x{:x} has no dynamic type",
                        container
                    ));
                };

                let vw = ValueWitness::read(image, ty)?;
                if vw.is_inline() {
                    return Ok(Some(container));
                }

                let Some(boxed) = image.read_pointer(container)? else {
                    return Err(malformed_error!(
                        "Out-of-line container at 0x{:x} has a null box",
                        container
                    ));
                };
                let header = align_up(2 * image.pointer_size(), vw.alignment_mask());
                Ok(Some(image.offset_address(boxed, header as i64)?))
            }
            ExistentialRepresentation::Unsupported => Ok(None),
        }
    }

    /// Concrete type of the value held by the container at `container`.
    ///
    /// Class-constrained containers ask the foreign object system for the instance's class
    /// and bridge foreign classes to native handles. Returns `Ok(None)` for unsupported
    /// representations and for values whose type cannot be recovered.
    ///
    /// # Errors
    ///
    /// Returns an error if the container or the class header is unreadable.
    pub fn dynamic_type(
        &self,
        image: &Image,
        runtime: &dyn Runtime,
        container: u64,
    ) -> Result<Option<TypeHandle>> {
        match self.representation() {
            ExistentialRepresentation::Class => {
                let Some(object) = image.read_pointer(container)? else {
                    return Ok(None);
                };
                let Some(class) = runtime.class_of_instance(image, object) else {
                    return Ok(None);
                };

                if AnyClassMetadata::read(image, class)?.is_native() {
                    Ok(Some(class))
                } else {
                    Ok(runtime.native_handle_for_foreign_class(class))
                }
            }
            ExistentialRepresentation::Opaque => self.opaque_type(image, container),
            ExistentialRepresentation::Unsupported => Ok(None),
        }
    }

    fn opaque_type(&self, image: &Image, container: u64) -> Result<Option<TypeHandle>> {
        let slot = image.word_address(container, OPAQUE_BUFFER_WORDS as i64)?;
        Ok(TypeHandle::from_pointer(image.read_pointer(slot)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{layout::LayoutBuilder, runtime::StubRuntime};
    use crate::PointerWidth;

    #[test]
    fn representation_from_flags() {
        let meta = |flags| ExistentialMetadata {
            handle: TypeHandle::new(0),
            flags,
            num_protocols: 1,
        };

        assert_eq!(meta(0).representation(), ExistentialRepresentation::Class);
        assert_eq!(
            meta(EXISTENTIAL_NON_CLASS_CONSTRAINT | 1).representation(),
            ExistentialRepresentation::Opaque
        );
        assert_eq!(
            meta(EXISTENTIAL_NON_CLASS_CONSTRAINT | (1 << 24)).representation(),
            ExistentialRepresentation::Unsupported
        );
        assert_eq!(meta(0x0100_0000).special_protocol(), 1);
        assert_eq!(meta(3).num_witness_tables(), 3);
        assert!(meta(EXISTENTIAL_HAS_SUPERCLASS).has_superclass());
    }

    #[test]
    fn class_container_projects_slot() {
        let mut layout = LayoutBuilder::new(PointerWidth::Bits64);
        let class = layout.class(crate::test::layout::ClassSpec::new("C"));
        let object = layout.instance(class, 16);
        let existential = layout.existential(0);
        let container = layout.class_container(object);
        let image = layout.build();
        let runtime = StubRuntime::new();

        let meta = ExistentialMetadata::read(&image, existential).unwrap();
        assert_eq!(meta.project_value(&image, container).unwrap(), Some(container));
        assert_ne!(object, container);
        assert_eq!(
            meta.dynamic_type(&image, &runtime, container).unwrap(),
            Some(class)
        );
    }

    #[test]
    fn foreign_class_is_bridged() {
        let mut layout = LayoutBuilder::new(PointerWidth::Bits64);
        let foreign = layout.foreign_class(None);
        let native = layout.class(crate::test::layout::ClassSpec::new("Bridged"));
        let object = layout.instance(foreign, 16);
        let existential = layout.existential(0);
        let container = layout.class_container(object);
        let image = layout.build();
        let runtime = StubRuntime::new().with_bridge(foreign, native);

        let meta = ExistentialMetadata::read(&image, existential).unwrap();
        assert_eq!(
            meta.dynamic_type(&image, &runtime, container).unwrap(),
            Some(native)
        );
        assert_eq!(runtime.calls().bridge, 1);
    }

    #[test]
    fn opaque_inline_and_boxed() {
        let mut layout = LayoutBuilder::new(PointerWidth::Bits64);
        let int = layout.builtin_int();
        let big = layout.opaque_type(40, 15, crate::metadata::valuewitness::ValueWitnessFlags::IS_NON_INLINE.bits());
        let existential = layout.existential(EXISTENTIAL_NON_CLASS_CONSTRAINT);
        let inline = layout.opaque_container(int, None);
        let boxed = layout.alloc_words(8);
        let outline = layout.opaque_container(big, Some(boxed));
        let image = layout.build();
        let runtime = StubRuntime::new();

        let meta = ExistentialMetadata::read(&image, existential).unwrap();
        assert_eq!(meta.project_value(&image, inline).unwrap(), Some(inline));
        assert_eq!(
            meta.dynamic_type(&image, &runtime, inline).unwrap(),
            Some(int)
        );
        // two word header aligned to 16
        assert_eq!(meta.project_value(&image, outline).unwrap(), Some(boxed + 16));
        assert_eq!(
            meta.dynamic_type(&image, &runtime, outline).unwrap(),
            Some(big)
        );
    }

    #[test]
    fn unsupported_projects_nothing() {
        let mut layout = LayoutBuilder::new(PointerWidth::Bits64);
        let existential = layout.existential(EXISTENTIAL_NON_CLASS_CONSTRAINT | (1 << 24));
        let container = layout.alloc_words(4);
        let image = layout.build();
        let runtime = StubRuntime::new();

        let meta = ExistentialMetadata::read(&image, existential).unwrap();
        assert_eq!(meta.project_value(&image, container).unwrap(), None);
        assert_eq!(
            meta.dynamic_type(&image, &runtime, container).unwrap(),
            None
        );
    }
}
