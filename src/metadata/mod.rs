//! Typed, read-only views over runtime type metadata.
//!
//! Every type known to the managed runtime is described by a block of metadata whose address
//! is the type's [`crate::metadata::TypeHandle`]. The first word of the block is a kind tag; the
//! word immediately before it points at the type's value-witness table; the rest of the block
//! is kind-specific. Nominal types additionally point at a statically allocated context
//! descriptor which carries the type's name and its reflection metadata (field records).
//!
//! This module reproduces those layouts byte-for-byte, for both 32- and 64-bit targets, and
//! exposes them as small `Copy` views that are decoded from an [`crate::Image`] on demand.
//! Nothing here interprets the layouts beyond what a single view needs; the walking algorithms
//! live in [`crate::visitor`].
//!
//! # Key Components
//!
//! - [`crate::metadata::kind`] - Kind tags and their canonicalisation
//! - [`crate::metadata::relative`] - Self-relative references
//! - [`crate::metadata::valuewitness`] - Size, stride, alignment and flags
//! - [`crate::metadata::descriptor`] - Context descriptors (struct, enum, class)
//! - [`crate::metadata::fields`] - Reflection field descriptors and records
//! - [`crate::metadata::typename`] - Encoded type-name scanning and ownership suffixes
//! - [`crate::metadata::nominal`], [`crate::metadata::tuple`], [`crate::metadata::class`],
//!   [`crate::metadata::function`], [`crate::metadata::existential`],
//!   [`crate::metadata::heap`] - Per-kind metadata views
//!
//! # Layout Summary (64-bit)
//!
//! ```text
//!  handle - 8  : value witness table pointer
//!  handle + 0  : kind (or isa pointer for classes)
//!  handle + 8  : kind-specific (descriptor, superclass, element count, ...)
//! ```

pub mod class;
pub mod descriptor;
pub mod existential;
pub mod fields;
pub mod function;
pub mod heap;
pub mod kind;
pub mod nominal;
pub mod relative;
pub mod tuple;
pub mod typename;
pub mod valuewitness;

use std::fmt;

use crate::{
    metadata::{kind::MetadataKind, valuewitness::ValueWitness},
    Image, Result,
};

/// Opaque handle identifying a concrete type's metadata.
///
/// A handle is the address of the metadata inside an [`Image`]. It is never owned by this
/// crate: the runtime (or the dump it came from) is responsible for keeping the metadata alive
/// for as long as the handle is used.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(u64);

impl TypeHandle {
    /// Wraps a metadata address
    #[must_use]
    pub const fn new(address: u64) -> Self {
        TypeHandle(address)
    }

    /// Wraps a possibly-null metadata pointer
    #[must_use]
    pub fn from_pointer(pointer: Option<u64>) -> Option<Self> {
        pointer.map(TypeHandle)
    }

    /// Address of the metadata
    #[must_use]
    pub const fn address(self) -> u64 {
        self.0
    }

    /// Reads and canonicalises the kind tag of this metadata.
    ///
    /// Returns `Ok(None)` for tags this crate does not recognise.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind word lies outside the image.
    pub fn kind(self, image: &Image) -> Result<Option<MetadataKind>> {
        MetadataKind::read(image, self)
    }

    /// Reads the value-witness table of this type.
    ///
    /// # Errors
    ///
    /// Returns an error if the witness table pointer or the table itself is unreadable.
    pub fn value_witness(self, image: &Image) -> Result<ValueWitness> {
        ValueWitness::read(image, self)
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle(0x{:x})", self.0)
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<TypeHandle> for u64 {
    fn from(handle: TypeHandle) -> Self {
        handle.0
    }
}
