//! Context descriptors.
//!
//! A context descriptor is the statically emitted description of a declaration: a module,
//! an extension, a protocol or a nominal type. Nominal type metadata points at its
//! descriptor, and the descriptor in turn points at the type's name, its reflection field
//! descriptor and, for structs and classes, the position of the field offset vector inside
//! the metadata.
//!
//! # Layout
//!
//! All offsets are in bytes from the descriptor address; references are 32-bit relative.
//!
//! ```text
//!  common     0 flags (u32)              4 parent
//!  nominal    8 name                    12 access function       16 reflection fields
//!  struct    20 field count             24 field offset vector offset (words)
//!  enum      20 payload cases (24 bits) 24 empty cases
//!  class     20 superclass type name    24 negative size | resilient bounds
//!            28 positive size           32 immediate members      36 field count
//!            40 field offset vector offset
//! ```
//!
//! # Resilient Classes
//!
//! A class whose superclass lives in another resilience domain cannot know statically where
//! its own members start. Its descriptor instead references a bounds cache that the runtime
//! fills in when the class is first realised; the cache stores the immediate members offset
//! in bytes. [`crate::metadata::descriptor::ClassDescriptor::immediate_members_offset`]
//! normalises both forms to words.

use bitflags::bitflags;
use strum::{Display, EnumIter};

use crate::{
    metadata::relative::{read_relative, read_relative_indirectable},
    Image, Result,
};

/// Mask selecting the [`ContextKind`] bits of the descriptor flags
pub const CONTEXT_KIND_MASK: u32 = 0x1F;
/// Mask selecting the payload case count of an enum descriptor
pub const ENUM_PAYLOAD_CASES_MASK: u32 = 0x00FF_FFFF;

bitflags! {
    /// Kind-independent descriptor flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContextFlags: u32 {
        /// The context is uniqued by the runtime
        const IS_UNIQUE = 0x40;
        /// The context has generic parameters
        const IS_GENERIC = 0x80;
    }
}

bitflags! {
    /// Class-specific flags, stored in the top 16 bits of the descriptor flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassDescriptorFlags: u16 {
        /// The descriptor carries import information
        const HAS_IMPORT_INFO = 1 << 2;
        /// Immediate members are laid out at negative offsets
        const IMMEDIATE_MEMBERS_NEGATIVE = 1 << 12;
        /// The superclass belongs to another resilience domain
        const HAS_RESILIENT_SUPERCLASS = 1 << 13;
        /// The descriptor is followed by a method override table
        const HAS_OVERRIDE_TABLE = 1 << 14;
        /// The descriptor is followed by a vtable
        const HAS_VTABLE = 1 << 15;
    }
}

/// Declaration kinds a context descriptor can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ContextKind {
    /// Module
    Module,
    /// Extension
    Extension,
    /// Anonymous context
    Anonymous,
    /// Protocol
    Protocol,
    /// Class
    Class,
    /// Struct
    Struct,
    /// Enum
    Enum,
}

impl ContextKind {
    /// Decodes the kind bits of a descriptor's flags word
    #[must_use]
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw & CONTEXT_KIND_MASK {
            0 => Some(ContextKind::Module),
            1 => Some(ContextKind::Extension),
            2 => Some(ContextKind::Anonymous),
            3 => Some(ContextKind::Protocol),
            0x10 => Some(ContextKind::Class),
            0x11 => Some(ContextKind::Struct),
            0x12 => Some(ContextKind::Enum),
            _ => None,
        }
    }

    /// Raw kind bits
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            ContextKind::Module => 0,
            ContextKind::Extension => 1,
            ContextKind::Anonymous => 2,
            ContextKind::Protocol => 3,
            ContextKind::Class => 0x10,
            ContextKind::Struct => 0x11,
            ContextKind::Enum => 0x12,
        }
    }
}

/// Fields shared by every context descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeader {
    /// Address of the descriptor
    pub address: u64,
    /// Raw flags word
    pub flags: u32,
    /// Enclosing context, if any
    pub parent: Option<u64>,
}

impl DescriptorHeader {
    fn read(image: &Image, address: u64) -> Result<Self> {
        Ok(DescriptorHeader {
            address,
            flags: image.read_u32(address)?,
            parent: read_relative_indirectable(image, address + 4)?,
        })
    }

    /// Declaration kind
    #[must_use]
    pub fn kind(&self) -> Option<ContextKind> {
        ContextKind::from_raw(self.flags)
    }

    /// Kind-independent flags
    #[must_use]
    pub fn context_flags(&self) -> ContextFlags {
        ContextFlags::from_bits_truncate(self.flags)
    }

    /// True if the declaration has generic parameters
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.context_flags().contains(ContextFlags::IS_GENERIC)
    }

    /// Kind-specific flags (upper half of the flags word)
    #[must_use]
    pub fn kind_specific_flags(&self) -> u16 {
        (self.flags >> 16) as u16
    }
}

/// References shared by struct, enum and class descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NominalReferences {
    /// NUL-terminated type name
    pub name: Option<u64>,
    /// Metadata access function
    pub access_function: Option<u64>,
    /// Reflection field descriptor
    pub fields: Option<u64>,
}

impl NominalReferences {
    fn read(image: &Image, address: u64) -> Result<Self> {
        Ok(NominalReferences {
            name: read_relative(image, address + 8)?,
            access_function: read_relative(image, address + 12)?,
            fields: read_relative_indirectable(image, address + 16)?,
        })
    }
}

/// Descriptor of a struct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructDescriptor {
    /// Common header
    pub header: DescriptorHeader,
    /// Name and reflection references
    pub nominal: NominalReferences,
    /// Number of stored properties
    pub num_fields: u32,
    /// Position of the field offset vector, in words from the metadata address
    pub field_offset_vector_offset: u32,
}

/// Descriptor of an enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumDescriptor {
    /// Common header
    pub header: DescriptorHeader,
    /// Name and reflection references
    pub nominal: NominalReferences,
    /// Payload case count (low 24 bits) and payload size offset (high 8 bits)
    pub num_payload_cases_and_payload_size_offset: u32,
    /// Number of cases without a payload
    pub num_empty_cases: u32,
}

impl EnumDescriptor {
    /// Number of cases carrying a payload
    #[must_use]
    pub fn num_payload_cases(&self) -> u32 {
        self.num_payload_cases_and_payload_size_offset & ENUM_PAYLOAD_CASES_MASK
    }

    /// Word offset of the payload size in the metadata, zero if absent
    #[must_use]
    pub fn payload_size_offset(&self) -> u8 {
        (self.num_payload_cases_and_payload_size_offset >> 24) as u8
    }

    /// Total number of cases
    #[must_use]
    pub fn num_cases(&self) -> u64 {
        u64::from(self.num_payload_cases()) + u64::from(self.num_empty_cases)
    }
}

/// Where a class's immediate members start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassMetadataBounds {
    /// Statically known bounds, in words
    Fixed {
        /// Words of metadata before the address point
        negative_size: u32,
        /// Words of metadata after the address point
        positive_size: u32,
    },
    /// Bounds computed by the runtime into a cache
    Resilient {
        /// Address of the bounds cache
        cache: Option<u64>,
    },
}

/// Descriptor of a class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDescriptor {
    /// Common header
    pub header: DescriptorHeader,
    /// Name and reflection references
    pub nominal: NominalReferences,
    /// Encoded name of the superclass type, if any
    pub superclass_type: Option<u64>,
    /// Metadata bounds
    pub bounds: ClassMetadataBounds,
    /// Number of members added by this class (generic args, field offsets, vtable)
    pub num_immediate_members: u32,
    /// Number of stored properties declared by this class
    pub num_fields: u32,
    /// Raw field offset vector offset, relative to the immediate members if resilient
    pub field_offset_vector_offset: u32,
}

impl ClassDescriptor {
    /// Class-specific flags
    #[must_use]
    pub fn flags(&self) -> ClassDescriptorFlags {
        ClassDescriptorFlags::from_bits_retain(self.header.kind_specific_flags())
    }

    /// True if the class has a superclass from another resilience domain
    #[must_use]
    pub fn has_resilient_superclass(&self) -> bool {
        self.flags()
            .contains(ClassDescriptorFlags::HAS_RESILIENT_SUPERCLASS)
    }

    /// True if the metadata has a field offset vector
    #[must_use]
    pub fn has_field_offset_vector(&self) -> bool {
        self.field_offset_vector_offset != 0
    }

    /// Offset of the first immediate member from the metadata address, in words.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unknowable`] for a resilient class whose bounds cache is missing
    /// and an access error if the cache is unreadable.
    pub fn immediate_members_offset(&self, image: &Image) -> Result<i64> {
        match self.bounds {
            ClassMetadataBounds::Fixed {
                negative_size,
                positive_size,
            } => {
                if self
                    .flags()
                    .contains(ClassDescriptorFlags::IMMEDIATE_MEMBERS_NEGATIVE)
                {
                    Ok(-i64::from(negative_size))
                } else {
                    Ok(i64::from(positive_size) - i64::from(self.num_immediate_members))
                }
            }
            ClassMetadataBounds::Resilient { cache } => {
                let Some(cache) = cache else {
                    return Err(unknowable!(
                        "Resilient class descriptor 0x{:x} has no bounds cache",
                        self.header.address
                    ));
                };

                let bytes = image.read_signed_word(cache)?;
                let word = image.pointer_size() as i64;
                if bytes % word != 0 {
                    return Err(malformed_error!(
                        "Immediate members offset {} is not word aligned",
                        bytes
                    ));
                }

                Ok(bytes / word)
            }
        }
    }

    /// Offset of the field offset vector from the metadata address, in words.
    ///
    /// Returns `Ok(None)` for classes without stored properties.
    ///
    /// # Errors
    ///
    /// Propagates errors of [`ClassDescriptor::immediate_members_offset`].
    pub fn field_offset_vector_words(&self, image: &Image) -> Result<Option<i64>> {
        if !self.has_field_offset_vector() {
            return Ok(None);
        }

        let raw = i64::from(self.field_offset_vector_offset);
        if self.has_resilient_superclass() {
            Ok(Some(self.immediate_members_offset(image)? + raw))
        } else {
            Ok(Some(raw))
        }
    }

    /// Offset of the generic argument vector from the metadata address, in words
    ///
    /// # Errors
    ///
    /// Propagates errors of [`ClassDescriptor::immediate_members_offset`].
    pub fn generic_arguments_words(&self, image: &Image) -> Result<i64> {
        self.immediate_members_offset(image)
    }
}

/// A decoded context descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextDescriptor {
    /// Struct descriptor
    Struct(StructDescriptor),
    /// Enum descriptor
    Enum(EnumDescriptor),
    /// Class descriptor
    Class(ClassDescriptor),
    /// Any other declaration; only the header is decoded
    Other(DescriptorHeader),
}

impl ContextDescriptor {
    /// Reads the descriptor at `address`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the descriptor is not fully contained in the image.
    pub fn read(image: &Image, address: u64) -> Result<Self> {
        let header = DescriptorHeader::read(image, address)?;

        match header.kind() {
            Some(ContextKind::Struct) => Ok(ContextDescriptor::Struct(StructDescriptor {
                header,
                nominal: NominalReferences::read(image, address)?,
                num_fields: image.read_u32(address + 20)?,
                field_offset_vector_offset: image.read_u32(address + 24)?,
            })),
            Some(ContextKind::Enum) => Ok(ContextDescriptor::Enum(EnumDescriptor {
                header,
                nominal: NominalReferences::read(image, address)?,
                num_payload_cases_and_payload_size_offset: image.read_u32(address + 20)?,
                num_empty_cases: image.read_u32(address + 24)?,
            })),
            Some(ContextKind::Class) => {
                let flags = ClassDescriptorFlags::from_bits_retain(header.kind_specific_flags());
                let bounds = if flags.contains(ClassDescriptorFlags::HAS_RESILIENT_SUPERCLASS) {
                    ClassMetadataBounds::Resilient {
                        cache: read_relative(image, address + 24)?,
                    }
                } else {
                    ClassMetadataBounds::Fixed {
                        negative_size: image.read_u32(address + 24)?,
                        positive_size: image.read_u32(address + 28)?,
                    }
                };

                Ok(ContextDescriptor::Class(ClassDescriptor {
                    header,
                    nominal: NominalReferences::read(image, address)?,
                    superclass_type: read_relative(image, address + 20)?,
                    bounds,
                    num_immediate_members: image.read_u32(address + 32)?,
                    num_fields: image.read_u32(address + 36)?,
                    field_offset_vector_offset: image.read_u32(address + 40)?,
                }))
            }
            _ => Ok(ContextDescriptor::Other(header)),
        }
    }

    /// Common header
    #[must_use]
    pub fn header(&self) -> &DescriptorHeader {
        match self {
            ContextDescriptor::Struct(d) => &d.header,
            ContextDescriptor::Enum(d) => &d.header,
            ContextDescriptor::Class(d) => &d.header,
            ContextDescriptor::Other(h) => h,
        }
    }

    /// Name and reflection references, for nominal type descriptors
    #[must_use]
    pub fn nominal(&self) -> Option<&NominalReferences> {
        match self {
            ContextDescriptor::Struct(d) => Some(&d.nominal),
            ContextDescriptor::Enum(d) => Some(&d.nominal),
            ContextDescriptor::Class(d) => Some(&d.nominal),
            ContextDescriptor::Other(_) => None,
        }
    }

    /// Address of the descriptor
    #[must_use]
    pub fn address(&self) -> u64 {
        self.header().address
    }

    /// True if the declaration has generic parameters
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.header().is_generic()
    }
}
