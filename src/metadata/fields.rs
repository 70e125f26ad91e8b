//! Reflection field descriptors.
//!
//! A nominal type descriptor references a field descriptor which lists the type's stored
//! properties (or, for enums, its cases) in declaration order. Each record carries the
//! property name and an *encoded* type name that has to be resolved into metadata in the
//! context of the enclosing type; see [`crate::metadata::typename`].
//!
//! ```text
//!  descriptor  0 mangled type name   4 superclass   8 kind (u16)
//!             10 record size (u16)  12 record count 16 records...
//!  record      0 flags (u32)         4 mangled type name   8 field name
//! ```

use bitflags::bitflags;
use strum::{Display, EnumIter};

use crate::{metadata::relative::read_relative, Image, Result};

/// Size of the field descriptor header
pub const FIELD_DESCRIPTOR_HEADER_SIZE: u64 = 16;
/// Size of a field record
pub const FIELD_RECORD_SIZE: u64 = 12;

/// What a field descriptor describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum FieldDescriptorKind {
    /// Struct properties
    Struct,
    /// Class properties
    Class,
    /// Cases of an enum with at most one payload case
    Enum,
    /// Cases of an enum with several payload cases
    MultiPayloadEnum,
    /// Protocol requirements
    Protocol,
    /// Foreign protocol requirements
    ObjCProtocol,
    /// Foreign class properties
    ObjCClass,
}

impl FieldDescriptorKind {
    /// Decodes the kind field of a field descriptor
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(FieldDescriptorKind::Struct),
            1 => Some(FieldDescriptorKind::Class),
            2 => Some(FieldDescriptorKind::Enum),
            3 => Some(FieldDescriptorKind::MultiPayloadEnum),
            4 => Some(FieldDescriptorKind::Protocol),
            5 => Some(FieldDescriptorKind::ObjCProtocol),
            6 => Some(FieldDescriptorKind::ObjCClass),
            _ => None,
        }
    }

    /// True for enum case lists
    #[must_use]
    pub fn is_enum(self) -> bool {
        matches!(
            self,
            FieldDescriptorKind::Enum | FieldDescriptorKind::MultiPayloadEnum
        )
    }
}

bitflags! {
    /// Per-record flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldRecordFlags: u32 {
        /// Enum case stored out of line in a box
        const IS_INDIRECT_CASE = 0x1;
        /// Mutable property
        const IS_VAR = 0x2;
    }
}

/// One stored property or enum case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRecord {
    /// Address of the record
    pub address: u64,
    /// Record flags
    pub flags: FieldRecordFlags,
    /// Encoded type name; absent for enum cases without payload
    pub mangled_type_name: Option<u64>,
    /// NUL-terminated property or case name
    pub field_name: Option<u64>,
}

impl FieldRecord {
    /// Reads the record at `address`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the record is not contained in the image.
    pub fn read(image: &Image, address: u64) -> Result<Self> {
        Ok(FieldRecord {
            address,
            flags: FieldRecordFlags::from_bits_retain(image.read_u32(address)?),
            mangled_type_name: read_relative(image, address + 4)?,
            field_name: read_relative(image, address + 8)?,
        })
    }

    /// True if the record has a type reference (payload cases and properties)
    #[must_use]
    pub fn has_type(&self) -> bool {
        self.mangled_type_name.is_some()
    }

    /// True for indirect enum cases
    #[must_use]
    pub fn is_indirect_case(&self) -> bool {
        self.flags.contains(FieldRecordFlags::IS_INDIRECT_CASE)
    }

    /// True for mutable properties
    #[must_use]
    pub fn is_var(&self) -> bool {
        self.flags.contains(FieldRecordFlags::IS_VAR)
    }

    /// Bytes of the field name, without the terminator
    ///
    /// # Errors
    ///
    /// Returns an access error if the name is unterminated within the image.
    pub fn name<'a>(&self, image: &'a Image) -> Result<Option<&'a [u8]>> {
        self.field_name
            .map(|address| image.c_str(address))
            .transpose()
    }
}

/// Header of a field descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Address of the descriptor
    pub address: u64,
    /// Encoded name of the described type
    pub mangled_type_name: Option<u64>,
    /// Encoded name of the superclass
    pub superclass: Option<u64>,
    /// Raw kind
    pub kind: u16,
    /// Declared size of each record
    pub field_record_size: u16,
    /// Number of records
    pub num_fields: u32,
}

impl FieldDescriptor {
    /// Reads the descriptor header at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for a record size other than
    /// [`FIELD_RECORD_SIZE`], or an access error if the header is not contained in the image.
    pub fn read(image: &Image, address: u64) -> Result<Self> {
        let descriptor = FieldDescriptor {
            address,
            mangled_type_name: read_relative(image, address)?,
            superclass: read_relative(image, address + 4)?,
            kind: image.read_u16(address + 8)?,
            field_record_size: image.read_u16(address + 10)?,
            num_fields: image.read_u32(address + 12)?,
        };

        if descriptor.num_fields > 0 && u64::from(descriptor.field_record_size) != FIELD_RECORD_SIZE
        {
            return Err(malformed_error!(
                "Field descriptor 0x{:x} has record size {}",
                address,
                descriptor.field_record_size
            ));
        }

        Ok(descriptor)
    }

    /// Decoded kind
    #[must_use]
    pub fn kind(&self) -> Option<FieldDescriptorKind> {
        FieldDescriptorKind::from_raw(self.kind)
    }

    /// Reads record `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `index` is not below the record count, or an
    /// access error if the record is not contained in the image.
    pub fn record(&self, image: &Image, index: u32) -> Result<FieldRecord> {
        if index >= self.num_fields {
            return Err(crate::Error::OutOfBounds);
        }

        let address = self
            .address
            .checked_add(FIELD_DESCRIPTOR_HEADER_SIZE + u64::from(index) * FIELD_RECORD_SIZE)
            .ok_or(crate::Error::InvalidAddress(self.address))?;
        FieldRecord::read(image, address)
    }

    /// Iterates over all records in declaration order
    pub fn records<'a>(&self, image: &'a Image) -> impl Iterator<Item = Result<FieldRecord>> + 'a {
        let descriptor = *self;
        (0..self.num_fields).map(move |index| descriptor.record(image, index))
    }
}
