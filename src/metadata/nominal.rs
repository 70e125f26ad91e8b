//! Struct and enum metadata.
//!
//! Value-type metadata is small: a kind word, a pointer to the context descriptor and, for
//! generic types, the generic arguments. Structs additionally carry a vector of 32-bit field
//! offsets whose position is recorded in the descriptor.
//!
//! ```text
//!  handle + 0          : kind
//!  handle + W          : descriptor
//!  handle + 2W         : generic arguments (generic types only)
//!  handle + fovo * W   : field offsets, u32 each (structs only)
//! ```

use crate::{
    metadata::{
        descriptor::ContextDescriptor,
        kind::MetadataKind,
        TypeHandle,
    },
    Image, Result,
};

/// Word index of the generic argument vector in value-type metadata
pub const VALUE_GENERIC_ARGUMENTS_WORDS: u64 = 2;

/// View over struct, enum or optional metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NominalMetadata {
    /// Metadata handle
    pub handle: TypeHandle,
    /// Canonical kind
    pub kind: MetadataKind,
    /// Context descriptor address
    pub descriptor: Option<u64>,
}

impl NominalMetadata {
    /// Reads the value-type metadata at `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotSupported`] for kinds other than struct, enum and optional,
    /// or an access error if the metadata is not contained in the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Self> {
        let kind = match MetadataKind::read(image, handle)? {
            Some(kind @ (MetadataKind::Struct | MetadataKind::Enum | MetadataKind::Optional)) => {
                kind
            }
            _ => return Err(crate::Error::NotSupported),
        };

        Ok(NominalMetadata {
            handle,
            kind,
            descriptor: image.read_pointer(image.word_address(handle.address(), 1)?)?,
        })
    }

    /// Decodes the context descriptor
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor pointer is null.
    pub fn context_descriptor(&self, image: &Image) -> Result<ContextDescriptor> {
        let Some(descriptor) = self.descriptor else {
            return Err(malformed_error!(
                "Value metadata {} has no descriptor",
                self.handle
            ));
        };
        ContextDescriptor::read(image, descriptor)
    }

    /// Address of the generic argument vector
    ///
    /// # Errors
    ///
    /// Returns an error if the address overflows.
    pub fn generic_arguments(&self, image: &Image) -> Result<u64> {
        image.word_address(self.handle.address(), VALUE_GENERIC_ARGUMENTS_WORDS as i64)
    }

    /// Reads entry `index` of a struct's field offset vector located `fovo` words into the
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns an access error if the entry is not contained in the image.
    pub fn field_offset(&self, image: &Image, fovo: u32, index: u32) -> Result<u64> {
        let vector = image.word_address(self.handle.address(), i64::from(fovo))?;
        let entry = image.offset_address(vector, i64::from(index) * 4)?;
        Ok(u64::from(image.read_u32(entry)?))
    }
}
