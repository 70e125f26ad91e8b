//! The introspection context.
//!
//! An [`Introspector`] ties together the three inputs every walk needs: the [`Image`] holding
//! the metadata, the [`Runtime`] services that resolve names and answer foreign object
//! queries, and the [`IntrospectorConfig`] limits. It is the `cx` argument passed to every
//! [`crate::visitor::MetadataVisitor`] callback, so visitors can resolve types, read values or
//! start nested walks of their own.
//!
//! # Name Resolution
//!
//! Encoded names are resolved in the context of the type that declared them. The context is
//! that type's descriptor and, if the declaration is generic, the address of its generic
//! argument vector: inline after the descriptor pointer for structs and enums, at the
//! immediate members offset for classes. The ownership suffix of the name is decoded
//! alongside, so callers learn whether a field is a weak or unowned reference.
//!
//! # Examples
//!
//! ```rust,no_run
//! use metascope::{Image, Introspector, PointerWidth, runtime::RuntimeTables};
//! use metascope::metadata::TypeHandle;
//! use std::path::Path;
//!
//! let image = Image::from_file(Path::new("metadata.dump"), 0x1_0000_0000, PointerWidth::Bits64)?;
//! let runtime = RuntimeTables::new();
//! let cx = Introspector::new(&image, &runtime);
//!
//! let kind = TypeHandle::new(0x1_0000_4000).kind(cx.image())?;
//! println!("{kind:?}");
//! # Ok::<(), metascope::Error>(())
//! ```

use std::cell::OnceCell;

use tracing::trace;

use crate::{
    config::IntrospectorConfig,
    metadata::{
        class::AnyClassMetadata,
        descriptor::ContextDescriptor,
        existential::ExistentialMetadata,
        kind::MetadataKind,
        nominal::{NominalMetadata, VALUE_GENERIC_ARGUMENTS_WORDS},
        typename::{read_encoded_name, Ownership},
        TypeHandle,
    },
    runtime::Runtime,
    Image, Result,
};

/// Encoded name of the builtin native object reference type
pub const NATIVE_OBJECT_NAME: &[u8] = b"Bo";
/// Encoded name of the builtin raw pointer type
pub const RAW_POINTER_NAME: &[u8] = b"Bp";

/// A resolved type reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedType {
    /// Metadata of the referenced type
    pub ty: TypeHandle,
    /// Ownership of the reference
    pub ownership: Ownership,
}

/// Context for walking metadata in one image.
pub struct Introspector<'a> {
    image: &'a Image,
    runtime: &'a dyn Runtime,
    config: IntrospectorConfig,
    native_object: OnceCell<Option<TypeHandle>>,
    raw_pointer: OnceCell<Option<TypeHandle>>,
}

impl<'a> Introspector<'a> {
    /// Creates a context with the default configuration
    #[must_use]
    pub fn new(image: &'a Image, runtime: &'a dyn Runtime) -> Self {
        Self::with_config(image, runtime, IntrospectorConfig::default())
    }

    /// Creates a context with an explicit configuration
    #[must_use]
    pub fn with_config(image: &'a Image, runtime: &'a dyn Runtime, config: IntrospectorConfig) -> Self {
        Introspector {
            image,
            runtime,
            config,
            native_object: OnceCell::new(),
            raw_pointer: OnceCell::new(),
        }
    }

    /// Image holding the metadata
    #[must_use]
    pub fn image(&self) -> &'a Image {
        self.image
    }

    /// Runtime services
    #[must_use]
    pub fn runtime(&self) -> &'a dyn Runtime {
        self.runtime
    }

    /// Active limits
    #[must_use]
    pub fn config(&self) -> &IntrospectorConfig {
        &self.config
    }

    /// Metadata of the builtin native object reference type, resolved once
    pub fn native_object_type(&self) -> Option<TypeHandle> {
        *self
            .native_object
            .get_or_init(|| self.runtime.resolve_type(NATIVE_OBJECT_NAME, None, None))
    }

    /// Metadata of the builtin raw pointer type, resolved once
    pub fn raw_pointer_type(&self) -> Option<TypeHandle> {
        *self
            .raw_pointer
            .get_or_init(|| self.runtime.resolve_type(RAW_POINTER_NAME, None, None))
    }

    /// Context descriptor of `ty`.
    ///
    /// Only value types and native classes have descriptors; everything else yields
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an access error if the metadata or the descriptor is unreadable.
    pub fn descriptor(&self, ty: TypeHandle) -> Result<Option<ContextDescriptor>> {
        match ty.kind(self.image)? {
            Some(MetadataKind::Struct | MetadataKind::Enum | MetadataKind::Optional) => {
                match NominalMetadata::read(self.image, ty)?.descriptor {
                    Some(address) => Ok(Some(ContextDescriptor::read(self.image, address)?)),
                    None => Ok(None),
                }
            }
            Some(MetadataKind::Class) => {
                match AnyClassMetadata::read(self.image, ty)?.native(self.image)? {
                    Some(class) => match class.descriptor {
                        Some(address) => Ok(Some(ContextDescriptor::read(self.image, address)?)),
                        None => Ok(None),
                    },
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    /// Generic context for names declared by `ty`: its descriptor address and, when the
    /// declaration is generic, its generic argument vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is unreadable, or [`crate::Error::Malformed`] if a
    /// generic descriptor is not a nominal type descriptor.
    pub fn generic_context(&self, ty: TypeHandle) -> Result<(Option<u64>, Option<u64>)> {
        let Some(descriptor) = self.descriptor(ty)? else {
            return Ok((None, None));
        };

        if !descriptor.is_generic() {
            return Ok((Some(descriptor.address()), None));
        }

        let words = match &descriptor {
            ContextDescriptor::Struct(_) | ContextDescriptor::Enum(_) => {
                VALUE_GENERIC_ARGUMENTS_WORDS as i64
            }
            ContextDescriptor::Class(class) => class.generic_arguments_words(self.image)?,
            ContextDescriptor::Other(header) => {
                return Err(malformed_error!(
                    "Generic descriptor 0x{:x} of {} is not a type descriptor",
                    header.address,
                    ty
                ))
            }
        };

        let arguments = self.image.word_address(ty.address(), words)?;
        Ok((Some(descriptor.address()), Some(arguments)))
    }

    /// Resolves the encoded name at `name` in the context of `base`.
    ///
    /// Returns `Ok(None)` when the runtime cannot resolve the name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unterminated or the generic context is unreadable.
    pub fn resolve(&self, base: TypeHandle, name: u64) -> Result<Option<ResolvedType>> {
        let encoded = read_encoded_name(self.image, name)?;
        let (context, generic_args) = self.generic_context(base)?;

        let Some(ty) = self.runtime.resolve_type(encoded, context, generic_args) else {
            trace!(%base, name = %String::from_utf8_lossy(encoded), "name did not resolve");
            return Ok(None);
        };

        Ok(Some(ResolvedType {
            ty,
            ownership: Ownership::from_encoded_name(encoded),
        }))
    }

    /// Reads the existential metadata at `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotSupported`] if `ty` is not an existential type.
    pub fn existential(&self, ty: TypeHandle) -> Result<ExistentialMetadata> {
        match ty.kind(self.image)? {
            Some(MetadataKind::Existential) => ExistentialMetadata::read(self.image, ty),
            _ => Err(crate::Error::NotSupported),
        }
    }

    /// Address of the value held by an existential container of type `ty`.
    ///
    /// Returns `None` for unsupported representations and unreadable containers.
    pub fn project_value(&self, ty: TypeHandle, container: u64) -> Option<u64> {
        self.existential(ty)
            .and_then(|meta| meta.project_value(self.image, container))
            .ok()
            .flatten()
    }

    /// Concrete type of the value held by an existential container of type `ty`.
    ///
    /// Returns `None` for unsupported representations and unrecoverable types.
    pub fn dynamic_type(&self, ty: TypeHandle, container: u64) -> Option<TypeHandle> {
        self.existential(ty)
            .and_then(|meta| meta.dynamic_type(self.image, self.runtime, container))
            .ok()
            .flatten()
    }
}

impl std::fmt::Debug for Introspector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Introspector")
            .field("image", self.image)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
