//! Function type metadata.
//!
//! ```text
//!  handle + W            : flags (word)
//!  handle + 2W           : result type
//!  handle + 3W + W * i   : parameter i type
//!  after parameters      : parameter flags, u32 each (if HAS_PARAM_FLAGS)
//! ```

use strum::{Display, EnumIter};

use crate::{metadata::TypeHandle, Image, Result};

/// Mask selecting the parameter count
pub const FUNCTION_NUM_PARAMETERS_MASK: u64 = 0x0000_FFFF;
/// Mask selecting the calling convention
pub const FUNCTION_CONVENTION_MASK: u64 = 0x00FF_0000;
/// The function can throw
pub const FUNCTION_THROWS: u64 = 0x0100_0000;
/// Parameter flags follow the parameter types
pub const FUNCTION_HAS_PARAM_FLAGS: u64 = 0x0200_0000;
/// The function value may escape
pub const FUNCTION_IS_ESCAPING: u64 = 0x0400_0000;

/// Calling convention of a function type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum FunctionConvention {
    /// Native thick function (code pointer plus context)
    Swift,
    /// Foreign block
    Block,
    /// Thin function (code pointer only)
    Thin,
    /// C function pointer
    C,
}

impl FunctionConvention {
    /// Decodes the convention bits of a flags word
    #[must_use]
    pub fn from_flags(flags: u64) -> Option<Self> {
        match flags & FUNCTION_CONVENTION_MASK {
            0x0000_0000 => Some(FunctionConvention::Swift),
            0x0001_0000 => Some(FunctionConvention::Block),
            0x0002_0000 => Some(FunctionConvention::Thin),
            0x0004_0000 => Some(FunctionConvention::C),
            _ => None,
        }
    }
}

/// View over function type metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionMetadata {
    /// Metadata handle
    pub handle: TypeHandle,
    /// Raw flags word
    pub flags: u64,
    /// Result type
    pub result_type: Option<TypeHandle>,
}

impl FunctionMetadata {
    /// Reads the function metadata at `handle`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the header is not contained in the image.
    pub fn read(image: &Image, handle: TypeHandle) -> Result<Self> {
        let base = handle.address();
        Ok(FunctionMetadata {
            handle,
            flags: image.read_word(image.word_address(base, 1)?)?,
            result_type: TypeHandle::from_pointer(image.read_pointer(image.word_address(base, 2)?)?),
        })
    }

    /// Number of parameters
    #[must_use]
    pub fn num_parameters(&self) -> u64 {
        self.flags & FUNCTION_NUM_PARAMETERS_MASK
    }

    /// Calling convention
    #[must_use]
    pub fn convention(&self) -> Option<FunctionConvention> {
        FunctionConvention::from_flags(self.flags)
    }

    /// True for native thick functions
    #[must_use]
    pub fn is_convention_swift(&self) -> bool {
        self.convention() == Some(FunctionConvention::Swift)
    }

    /// True if the function can throw
    #[must_use]
    pub fn throws(&self) -> bool {
        self.flags & FUNCTION_THROWS != 0
    }

    /// True if the function value may escape
    #[must_use]
    pub fn is_escaping(&self) -> bool {
        self.flags & FUNCTION_IS_ESCAPING != 0
    }

    /// True if parameter flags are present
    #[must_use]
    pub fn has_parameter_flags(&self) -> bool {
        self.flags & FUNCTION_HAS_PARAM_FLAGS != 0
    }

    /// Type of parameter `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] for an index past the parameter count.
    pub fn parameter(&self, image: &Image, index: u64) -> Result<Option<TypeHandle>> {
        if index >= self.num_parameters() {
            return Err(crate::Error::OutOfBounds);
        }

        // index < 0x10000, so the word index cannot overflow
        let slot = image.word_address(self.handle.address(), 3 + index as i64)?;
        Ok(TypeHandle::from_pointer(image.read_pointer(slot)?))
    }

    /// Flags of parameter `index`; zero when the metadata carries no parameter flags.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] for an index past the parameter count.
    pub fn parameter_flags(&self, image: &Image, index: u64) -> Result<u32> {
        if index >= self.num_parameters() {
            return Err(crate::Error::OutOfBounds);
        }
        if !self.has_parameter_flags() {
            return Ok(0);
        }

        let flags = image.word_address(self.handle.address(), 3 + self.num_parameters() as i64)?;
        image.read_u32(flags + 4 * index)
    }
}
