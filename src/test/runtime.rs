//! Counting runtime stub backed by [`RuntimeTables`].

use std::cell::Cell;

use crate::{
    metadata::TypeHandle,
    runtime::{
        ClassBridge, ConformanceLookup, ForeignObjectSystem, IvarOffsets, RuntimeTables,
        TypeNameResolver,
    },
    Image,
};

/// Descriptor address standing in for the equality protocol
const EQUATABLE_PROTOCOL: u64 = 0xE0_0000;

/// Number of calls made into each runtime service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub resolve: usize,
    pub ivars: usize,
    pub class_of: usize,
    pub bridge: usize,
    pub conformance: usize,
    pub equals: usize,
}

/// Delegates to a set of tables and counts every query.
pub struct StubRuntime {
    tables: RuntimeTables,
    calls: Cell<Calls>,
}

impl StubRuntime {
    pub fn new() -> Self {
        StubRuntime {
            tables: RuntimeTables::new().with_equatable_protocol(EQUATABLE_PROTOCOL),
            calls: Cell::new(Calls::default()),
        }
    }

    /// Bridges the foreign class `foreign` to the native metadata `native`
    pub fn with_bridge(self, foreign: TypeHandle, native: TypeHandle) -> Self {
        self.tables.register_bridge(foreign, native);
        self
    }

    pub fn tables(&self) -> &RuntimeTables {
        &self.tables
    }

    pub fn calls(&self) -> Calls {
        self.calls.get()
    }

    pub fn equatable_protocol_address(&self) -> u64 {
        EQUATABLE_PROTOCOL
    }

    fn count(&self, update: impl FnOnce(&mut Calls)) {
        let mut calls = self.calls.get();
        update(&mut calls);
        self.calls.set(calls);
    }
}

impl TypeNameResolver for StubRuntime {
    fn resolve_type(
        &self,
        name: &[u8],
        context: Option<u64>,
        generic_args: Option<u64>,
    ) -> Option<TypeHandle> {
        self.count(|calls| calls.resolve += 1);
        self.tables.resolve_type(name, context, generic_args)
    }
}

impl ForeignObjectSystem for StubRuntime {
    fn instance_variable_offsets(&self, class: TypeHandle) -> Option<IvarOffsets> {
        self.count(|calls| calls.ivars += 1);
        self.tables.instance_variable_offsets(class)
    }

    fn class_of_instance(&self, image: &Image, object: u64) -> Option<TypeHandle> {
        self.count(|calls| calls.class_of += 1);
        self.tables.class_of_instance(image, object)
    }
}

impl ClassBridge for StubRuntime {
    fn native_handle_for_foreign_class(&self, class: TypeHandle) -> Option<TypeHandle> {
        self.count(|calls| calls.bridge += 1);
        self.tables.native_handle_for_foreign_class(class)
    }
}

impl ConformanceLookup for StubRuntime {
    fn conforms_to(&self, ty: TypeHandle, protocol: u64) -> Option<u64> {
        self.count(|calls| calls.conformance += 1);
        self.tables.conforms_to(ty, protocol)
    }

    fn equatable_protocol(&self) -> Option<u64> {
        self.tables.equatable_protocol()
    }

    fn invoke_equals(
        &self,
        image: &Image,
        lhs: u64,
        rhs: u64,
        ty: TypeHandle,
        witness: u64,
    ) -> Option<bool> {
        self.count(|calls| calls.equals += 1);
        self.tables.invoke_equals(image, lhs, rhs, ty, witness)
    }
}
