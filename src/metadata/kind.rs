//! Metadata kind tags.
//!
//! The kind is the first word of every metadata block. Values are composed from three flag
//! bits (`NON_TYPE`, `NON_HEAP`, `RUNTIME_PRIVATE`) and a small index. Class metadata is special:
//! its first word is usually an isa pointer into the foreign object system, which is always
//! larger than [`KIND_LAST_ENUMERATED`]. Any such value is therefore canonicalised to
//! [`MetadataKind::Class`] before dispatch, which also keeps future large tags on the
//! heap-object path.

use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter};

use crate::{metadata::TypeHandle, Image, Result};

/// Kind flag: the metadata does not describe a type (boxes, error objects)
pub const KIND_IS_NON_TYPE: u64 = 0x400;
/// Kind flag: values of the type are not heap objects
pub const KIND_IS_NON_HEAP: u64 = 0x200;
/// Kind flag: the layout is private to the runtime
pub const KIND_IS_RUNTIME_PRIVATE: u64 = 0x100;
/// Largest kind value that is a real tag; anything above is an isa pointer
pub const KIND_LAST_ENUMERATED: u64 = 0x7FF;

/// Canonical metadata kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum MetadataKind {
    /// Native class (also any isa pointer above the last enumerated kind)
    Class,
    /// Struct
    Struct,
    /// Enum
    Enum,
    /// Optional, laid out like an enum
    Optional,
    /// Class imported from a foreign object system without native metadata
    ForeignClass,
    /// Builtin opaque type (native object references, raw pointers, ...)
    Opaque,
    /// Tuple
    Tuple,
    /// Function type
    Function,
    /// Existential (protocol composition) type
    Existential,
    /// Metatype
    Metatype,
    /// Wrapper around a foreign class object
    ObjcClassWrapper,
    /// Existential metatype
    ExistentialMetatype,
    /// Heap box holding closure captures
    HeapLocalVariable,
    /// Heap box holding a single generic value
    HeapGenericLocalVariable,
    /// Boxed error value
    ErrorObject,
}

impl MetadataKind {
    /// Raw tag value of the kind
    #[must_use]
    pub const fn raw(self) -> u64 {
        match self {
            MetadataKind::Class => 0,
            MetadataKind::Struct => KIND_IS_NON_HEAP,
            MetadataKind::Enum => 1 | KIND_IS_NON_HEAP,
            MetadataKind::Optional => 2 | KIND_IS_NON_HEAP,
            MetadataKind::ForeignClass => 3 | KIND_IS_NON_HEAP,
            MetadataKind::Opaque => KIND_IS_RUNTIME_PRIVATE | KIND_IS_NON_HEAP,
            MetadataKind::Tuple => 1 | KIND_IS_RUNTIME_PRIVATE | KIND_IS_NON_HEAP,
            MetadataKind::Function => 2 | KIND_IS_RUNTIME_PRIVATE | KIND_IS_NON_HEAP,
            MetadataKind::Existential => 3 | KIND_IS_RUNTIME_PRIVATE | KIND_IS_NON_HEAP,
            MetadataKind::Metatype => 4 | KIND_IS_RUNTIME_PRIVATE | KIND_IS_NON_HEAP,
            MetadataKind::ObjcClassWrapper => 5 | KIND_IS_RUNTIME_PRIVATE | KIND_IS_NON_HEAP,
            MetadataKind::ExistentialMetatype => 6 | KIND_IS_RUNTIME_PRIVATE | KIND_IS_NON_HEAP,
            MetadataKind::HeapLocalVariable => KIND_IS_NON_TYPE,
            MetadataKind::HeapGenericLocalVariable => KIND_IS_NON_TYPE | KIND_IS_RUNTIME_PRIVATE,
            MetadataKind::ErrorObject => 1 | KIND_IS_NON_TYPE | KIND_IS_RUNTIME_PRIVATE,
        }
    }

    /// Canonicalises a raw kind word.
    ///
    /// Values above [`KIND_LAST_ENUMERATED`] map to [`MetadataKind::Class`]; unrecognised
    /// values at or below it yield `None`.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw > KIND_LAST_ENUMERATED {
            return Some(MetadataKind::Class);
        }

        let kind = match raw {
            0 => MetadataKind::Class,
            0x200 => MetadataKind::Struct,
            0x201 => MetadataKind::Enum,
            0x202 => MetadataKind::Optional,
            0x203 => MetadataKind::ForeignClass,
            0x300 => MetadataKind::Opaque,
            0x301 => MetadataKind::Tuple,
            0x302 => MetadataKind::Function,
            0x303 => MetadataKind::Existential,
            0x304 => MetadataKind::Metatype,
            0x305 => MetadataKind::ObjcClassWrapper,
            0x306 => MetadataKind::ExistentialMetatype,
            0x400 => MetadataKind::HeapLocalVariable,
            0x500 => MetadataKind::HeapGenericLocalVariable,
            0x501 => MetadataKind::ErrorObject,
            _ => return None,
        };

        Some(kind)
    }

    /// Reads the kind word of `handle` and canonicalises it.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind word lies outside the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Option<Self>> {
        Ok(Self::from_raw(image.read_word(handle.address())?))
    }

    /// True for kinds whose values live in the heap (classes and boxes)
    #[must_use]
    pub const fn is_heap(self) -> bool {
        self.raw() & KIND_IS_NON_HEAP == 0
    }

    /// True for kinds that describe a type rather than a heap box
    #[must_use]
    pub const fn is_type(self) -> bool {
        self.raw() & KIND_IS_NON_TYPE == 0
    }

    /// True for kinds whose layout is private to the runtime
    #[must_use]
    pub const fn is_runtime_private(self) -> bool {
        self.raw() & KIND_IS_RUNTIME_PRIVATE != 0
    }

    /// True for the value kinds that are walked in place by `visit`
    #[must_use]
    pub const fn is_value_aggregate(self) -> bool {
        matches!(
            self,
            MetadataKind::Struct | MetadataKind::Enum | MetadataKind::Optional | MetadataKind::Tuple
        )
    }
}

bitflags! {
    /// Selects which heap layouts `visit_heap` is allowed to descend into
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeapKindMask: u32 {
        /// Class instances
        const CLASS = 1 << 0;
        /// Closure capture boxes
        const LOCAL = 1 << 1;
        /// Single-value generic boxes
        const GENERIC = 1 << 2;
        /// Every heap layout
        const ALL = !0;
    }
}
