//! Heap box metadata.
//!
//! Two kinds of reference-counted boxes are not classes but still need walking:
//!
//! - **Local capture boxes** hold the variables captured by a closure. Their metadata points
//!   at a capture descriptor listing the generic bindings stored at the head of the box and
//!   the encoded type of every captured value.
//! - **Generic boxes** hold a single value of a runtime-known type.
//!
//! ```text
//!  local box metadata     W : offset to first capture (u32)   2W : capture descriptor
//!  generic box metadata   W : value offset (u32)              2W : boxed type
//!  capture descriptor     0 : captures   4 : metadata sources   8 : bindings
//!                        12 : capture type names (relative, 4 bytes each)
//!                         . : metadata sources (two relative names, 8 bytes each)
//! ```

use crate::{
    metadata::{relative::read_relative, TypeHandle},
    Image, Result,
};

/// Size of the capture descriptor header
pub const CAPTURE_DESCRIPTOR_HEADER_SIZE: u64 = 12;
/// Size of a capture type entry
pub const CAPTURE_TYPE_SIZE: u64 = 4;
/// Size of a metadata source entry
pub const METADATA_SOURCE_SIZE: u64 = 8;

/// Describes the captures stored in a local capture box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDescriptor {
    /// Address of the descriptor
    pub address: u64,
    /// Number of captured values
    pub num_capture_types: u32,
    /// Number of metadata sources needed to substitute generic captures
    pub num_metadata_sources: u32,
    /// Number of generic binding words at the head of the box
    pub num_bindings: u32,
}

impl CaptureDescriptor {
    /// Reads the capture descriptor at `address`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the header is not contained in the image.
    pub fn read(image: &Image, address: u64) -> Result<Self> {
        Ok(CaptureDescriptor {
            address,
            num_capture_types: image.read_u32(address)?,
            num_metadata_sources: image.read_u32(address + 4)?,
            num_bindings: image.read_u32(address + 8)?,
        })
    }

    /// Encoded type name of capture `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] for an index past the capture count.
    pub fn capture_type(&self, image: &Image, index: u32) -> Result<Option<u64>> {
        if index >= self.num_capture_types {
            return Err(crate::Error::OutOfBounds);
        }

        read_relative(
            image,
            self.address + CAPTURE_DESCRIPTOR_HEADER_SIZE + u64::from(index) * CAPTURE_TYPE_SIZE,
        )
    }

    /// Encoded type name and metadata source of source `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] for an index past the source count.
    pub fn metadata_source(&self, image: &Image, index: u32) -> Result<(Option<u64>, Option<u64>)> {
        if index >= self.num_metadata_sources {
            return Err(crate::Error::OutOfBounds);
        }

        let entry = self.address
            + CAPTURE_DESCRIPTOR_HEADER_SIZE
            + u64::from(self.num_capture_types) * CAPTURE_TYPE_SIZE
            + u64::from(index) * METADATA_SOURCE_SIZE;
        Ok((
            read_relative(image, entry)?,
            read_relative(image, entry + 4)?,
        ))
    }
}

/// View over local capture box metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapLocalMetadata {
    /// Metadata handle
    pub handle: TypeHandle,
    /// Byte offset of the first capture; zero when the box uses the standard header size
    pub offset_to_first_capture: u32,
    /// Capture descriptor
    pub descriptor: Option<u64>,
}

impl HeapLocalMetadata {
    /// Reads the local box metadata at `handle`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the metadata is not contained in the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Self> {
        let base = handle.address();
        Ok(HeapLocalMetadata {
            handle,
            offset_to_first_capture: image.read_u32(image.word_address(base, 1)?)?,
            descriptor: image.read_pointer(image.word_address(base, 2)?)?,
        })
    }

    /// Offset of the first capture, substituting the two-word object header for zero
    #[must_use]
    pub fn first_capture_offset(&self, image: &Image) -> u64 {
        match self.offset_to_first_capture {
            0 => 2 * image.pointer_size(),
            offset => u64::from(offset),
        }
    }

    /// Decodes the capture descriptor, if present
    ///
    /// # Errors
    ///
    /// Returns an access error if the descriptor is not contained in the image.
    pub fn capture_descriptor(&self, image: &Image) -> Result<Option<CaptureDescriptor>> {
        self.descriptor
            .map(|address| CaptureDescriptor::read(image, address))
            .transpose()
    }
}

/// View over generic box metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericBoxMetadata {
    /// Metadata handle
    pub handle: TypeHandle,
    /// Unaligned byte offset of the value
    pub offset: u32,
    /// Type of the boxed value
    pub boxed_type: Option<TypeHandle>,
}

impl GenericBoxMetadata {
    /// Reads the generic box metadata at `handle`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the metadata is not contained in the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Self> {
        let base = handle.address();
        Ok(GenericBoxMetadata {
            handle,
            offset: image.read_u32(image.word_address(base, 1)?)?,
            boxed_type: TypeHandle::from_pointer(image.read_pointer(image.word_address(base, 2)?)?),
        })
    }
}
