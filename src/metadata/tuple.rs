//! Tuple metadata.
//!
//! Tuple metadata is built by the runtime on demand, so element types and offsets are stored
//! resolved rather than as encoded names:
//!
//! ```text
//!  handle + W              : element count
//!  handle + 2W             : labels (relative, space separated)
//!  handle + 3W + 2W * i    : element i type
//!  handle + 4W + 2W * i    : element i offset
//! ```

use crate::{
    metadata::{relative::read_relative, TypeHandle},
    Image, Result,
};

/// One element of a tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleElement {
    /// Element type, absent for elements the runtime did not fill in
    pub ty: Option<TypeHandle>,
    /// Byte offset of the element within the tuple
    pub offset: u64,
}

/// View over tuple metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleMetadata {
    /// Metadata handle
    pub handle: TypeHandle,
    /// Number of elements
    pub num_elements: u64,
    /// Label string, if any element is labelled
    pub labels: Option<u64>,
}

impl TupleMetadata {
    /// Reads the tuple metadata at `handle`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the header is not contained in the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Self> {
        let base = handle.address();
        Ok(TupleMetadata {
            handle,
            num_elements: image.read_word(image.word_address(base, 1)?)?,
            labels: read_relative(image, image.word_address(base, 2)?)?,
        })
    }

    /// Reads element `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `index` is not below the element count, or an
    /// access error if the element is not contained in the image.
    pub fn element(&self, image: &Image, index: u64) -> Result<TupleElement> {
        if index >= self.num_elements {
            return Err(crate::Error::OutOfBounds);
        }

        let slot = i64::try_from(index)
            .ok()
            .and_then(|index| index.checked_mul(2))
            .and_then(|words| words.checked_add(3))
            .ok_or(crate::Error::InvalidAddress(self.handle.address()))?;
        let entry = image.word_address(self.handle.address(), slot)?;

        Ok(TupleElement {
            ty: TypeHandle::from_pointer(image.read_pointer(entry)?),
            offset: image.read_word(entry + image.pointer_size())?,
        })
    }

    /// Splits the label string into one entry per element.
    ///
    /// Labels are separated by single spaces; an unlabelled element has an empty label. Returns
    /// an empty list when the tuple has no labels at all.
    ///
    /// # Errors
    ///
    /// Returns an access error if the label string is unterminated within the image.
    pub fn labels<'a>(&self, image: &'a Image) -> Result<Vec<&'a [u8]>> {
        let Some(address) = self.labels else {
            return Ok(Vec::new());
        };

        Ok(image
            .c_str(address)?
            .split(|&b| b == b' ')
            .take(usize::try_from(self.num_elements).unwrap_or(usize::MAX))
            .collect())
    }
}
