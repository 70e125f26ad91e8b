//! Table-backed runtime services.
//!
//! [`RuntimeTables`] answers every runtime query from concurrent hash maps populated by the
//! embedder. Registration and lookup may happen from any thread; lookups never block each
//! other.

use dashmap::DashMap;
use tracing::trace;

use crate::{
    metadata::{typename::Ownership, TypeHandle},
    runtime::{
        ClassBridge, ConformanceLookup, ForeignObjectSystem, IvarOffsets, TypeNameResolver,
    },
    Image,
};

/// Equality implementation registered for a witness table.
///
/// Receives the image, the addresses of both values and their type.
pub type EqualityFn = fn(&Image, u64, u64, TypeHandle) -> bool;

/// Concurrent registration tables implementing [`crate::runtime::Runtime`].
pub struct RuntimeTables {
    types: DashMap<Vec<u8>, TypeHandle>,
    contextual_types: DashMap<(Vec<u8>, u64), TypeHandle>,
    ivar_offsets: DashMap<TypeHandle, IvarOffsets>,
    bridges: DashMap<TypeHandle, TypeHandle>,
    conformances: DashMap<(TypeHandle, u64), u64>,
    equality: DashMap<u64, EqualityFn>,
    equatable_protocol: Option<u64>,
    isa_mask: u64,
}

impl RuntimeTables {
    /// Creates empty tables with an identity isa mask
    #[must_use]
    pub fn new() -> Self {
        RuntimeTables {
            types: DashMap::new(),
            contextual_types: DashMap::new(),
            ivar_offsets: DashMap::new(),
            bridges: DashMap::new(),
            conformances: DashMap::new(),
            equality: DashMap::new(),
            equatable_protocol: None,
            isa_mask: u64::MAX,
        }
    }

    /// Sets the mask applied to an object's first word to obtain its class
    #[must_use]
    pub fn with_isa_mask(mut self, mask: u64) -> Self {
        self.isa_mask = mask;
        self
    }

    /// Sets the descriptor of the equality protocol
    #[must_use]
    pub fn with_equatable_protocol(mut self, protocol: u64) -> Self {
        self.equatable_protocol = Some(protocol);
        self
    }

    /// Registers the metadata an encoded name resolves to in any context
    pub fn register_type(&self, name: impl Into<Vec<u8>>, handle: TypeHandle) {
        self.types.insert(name.into(), handle);
    }

    /// Registers the metadata an encoded name resolves to within one context descriptor.
    ///
    /// Contextual entries take precedence over context-free ones, which is how generic
    /// parameters of different specialisations are told apart.
    pub fn register_type_in_context(&self, name: impl Into<Vec<u8>>, context: u64, handle: TypeHandle) {
        self.contextual_types.insert((name.into(), context), handle);
    }

    /// Registers the instance variable offsets of a foreign class
    pub fn register_ivar_offsets(&self, class: TypeHandle, offsets: impl IntoIterator<Item = u64>) {
        self.ivar_offsets.insert(class, offsets.into_iter().collect());
    }

    /// Registers the native metadata for a foreign class
    pub fn register_bridge(&self, foreign: TypeHandle, native: TypeHandle) {
        self.bridges.insert(foreign, native);
    }

    /// Registers a conformance of `ty` to `protocol`
    pub fn register_conformance(&self, ty: TypeHandle, protocol: u64, witness: u64) {
        self.conformances.insert((ty, protocol), witness);
    }

    /// Registers the equality implementation behind an equality witness table
    pub fn register_equality(&self, witness: u64, equals: EqualityFn) {
        self.equality.insert(witness, equals);
    }

    fn lookup(&self, name: &[u8], context: Option<u64>) -> Option<TypeHandle> {
        if let Some(context) = context {
            if let Some(handle) = self.contextual_types.get(&(name.to_vec(), context)) {
                return Some(*handle);
            }
        }

        self.types.get(name).map(|handle| *handle)
    }
}

impl Default for RuntimeTables {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeNameResolver for RuntimeTables {
    fn resolve_type(
        &self,
        name: &[u8],
        context: Option<u64>,
        _generic_args: Option<u64>,
    ) -> Option<TypeHandle> {
        if let Some(handle) = self.lookup(name, context) {
            return Some(handle);
        }

        // Ownership suffixes annotate the storage, not the referenced type
        if Ownership::from_encoded_name(name).is_strong() {
            return None;
        }

        let handle = self.lookup(&name[..name.len() - 2], context);
        trace!(?handle, "resolved through ownership suffix");
        handle
    }
}

impl ForeignObjectSystem for RuntimeTables {
    fn instance_variable_offsets(&self, class: TypeHandle) -> Option<IvarOffsets> {
        self.ivar_offsets.get(&class).map(|offsets| offsets.clone())
    }

    fn class_of_instance(&self, image: &Image, object: u64) -> Option<TypeHandle> {
        let isa = image.read_pointer(object).ok()??;
        TypeHandle::from_pointer(Some(isa & self.isa_mask).filter(|&class| class != 0))
    }
}

impl ClassBridge for RuntimeTables {
    fn native_handle_for_foreign_class(&self, class: TypeHandle) -> Option<TypeHandle> {
        self.bridges.get(&class).map(|native| *native)
    }
}

impl ConformanceLookup for RuntimeTables {
    fn conforms_to(&self, ty: TypeHandle, protocol: u64) -> Option<u64> {
        self.conformances.get(&(ty, protocol)).map(|witness| *witness)
    }

    fn equatable_protocol(&self) -> Option<u64> {
        self.equatable_protocol
    }

    fn invoke_equals(
        &self,
        image: &Image,
        lhs: u64,
        rhs: u64,
        ty: TypeHandle,
        witness: u64,
    ) -> Option<bool> {
        let equals = *self.equality.get(&witness)?;
        Some(equals(image, lhs, rhs, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{runtime::Runtime, ImageBuilder, PointerWidth};

    #[test]
    fn type_resolution() {
        let tables = RuntimeTables::new();
        let int = TypeHandle::new(0x100);
        let specialised = TypeHandle::new(0x200);
        tables.register_type("Si", int);
        tables.register_type("x", int);
        tables.register_type_in_context("x", 0x5000, specialised);

        assert_eq!(tables.resolve_type(b"Si", None, None), Some(int));
        assert_eq!(tables.resolve_type(b"x", None, None), Some(int));
        assert_eq!(tables.resolve_type(b"x", Some(0x5000), None), Some(specialised));
        assert_eq!(tables.resolve_type(b"x", Some(0x6000), None), Some(int));
        assert_eq!(tables.resolve_type(b"Sd", None, None), None);
    }

    #[test]
    fn ownership_suffix_resolution() {
        let tables = RuntimeTables::new();
        let class = TypeHandle::new(0x300);
        tables.register_type("4main1CC", class);

        assert_eq!(tables.resolve_type(b"4main1CCXw", None, None), Some(class));
        assert_eq!(tables.resolve_type(b"4main1CCXo", None, None), Some(class));
        assert_eq!(tables.resolve_type(b"4main1CCXz", None, None), None);
    }

    #[test]
    fn foreign_object_queries() {
        let mut builder = ImageBuilder::new(0x1000, PointerWidth::Bits64);
        let object = builder.alloc_words(2);
        builder.write_word(object, 0xF000_0000_0000_2000).unwrap();
        let image = builder.build().unwrap();

        let tables = RuntimeTables::new().with_isa_mask(0x0000_FFFF_FFFF_FFF8);
        let class = TypeHandle::new(0x2000);
        tables.register_ivar_offsets(class, [16, 24]);
        tables.register_bridge(class, TypeHandle::new(0x3000));

        assert_eq!(tables.class_of_instance(&image, object), Some(class));
        assert_eq!(
            tables.instance_variable_offsets(class).unwrap().as_slice(),
            &[16, 24]
        );
        assert!(tables.instance_variable_offsets(TypeHandle::new(1)).is_none());
        assert_eq!(
            tables.native_handle_for_foreign_class(class),
            Some(TypeHandle::new(0x3000))
        );
    }

    #[test]
    fn equality_dispatch() {
        fn always_equal(_: &Image, _: u64, _: u64, _: TypeHandle) -> bool {
            true
        }

        let mut builder = ImageBuilder::new(0x1000, PointerWidth::Bits64);
        builder.alloc_words(1);
        let image = builder.build().unwrap();

        let ty = TypeHandle::new(0x100);
        let tables = RuntimeTables::new().with_equatable_protocol(0x9000);
        tables.register_conformance(ty, 0x9000, 0x9100);
        tables.register_equality(0x9100, always_equal);

        let runtime: &dyn Runtime = &tables;
        assert_eq!(runtime.equatable_witness(ty), Some(0x9100));
        assert_eq!(runtime.equatable_witness(TypeHandle::new(0x200)), None);
        assert_eq!(
            runtime.invoke_equals(&image, 0x1000, 0x1000, ty, 0x9100),
            Some(true)
        );
        assert_eq!(runtime.invoke_equals(&image, 0x1000, 0x1000, ty, 0x9200), None);
    }

    #[test]
    fn tables_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RuntimeTables>();
    }
}
