//! Services consumed from the managed runtime.
//!
//! The introspection algorithms never call into a process-global runtime. Everything they
//! need from outside the metadata itself is expressed as one of four collaborator traits:
//!
//! - [`crate::runtime::TypeNameResolver`] - turns an encoded type name into metadata, in the
//!   generic context of the type that declared it
//! - [`crate::runtime::ForeignObjectSystem`] - instance variable offsets and instance classes
//!   from the foreign object model classes may interoperate with
//! - [`crate::runtime::ClassBridge`] - maps foreign classes to native metadata
//! - [`crate::runtime::ConformanceLookup`] - protocol conformances, used by the equality
//!   walker only
//!
//! [`crate::runtime::Runtime`] bundles all four and is implemented for every type that
//! implements them. [`crate::runtime::RuntimeTables`] is the production implementation: a set
//! of concurrent tables that an embedder fills in once at startup (from a symbol dump, a
//! debugger session, or an in-process registration hook) and then shares across threads.
//!
//! # Examples
//!
//! ```rust
//! use metascope::{metadata::TypeHandle, runtime::{RuntimeTables, TypeNameResolver}};
//!
//! let tables = RuntimeTables::new();
//! tables.register_type("Si", TypeHandle::new(0x1000));
//!
//! assert_eq!(tables.resolve_type(b"Si", None, None), Some(TypeHandle::new(0x1000)));
//! assert_eq!(tables.resolve_type(b"Sd", None, None), None);
//! ```

mod tables;

pub use tables::{EqualityFn, RuntimeTables};

use smallvec::SmallVec;

use crate::{metadata::TypeHandle, Image};

/// Instance variable offsets of a foreign class, inline for up to 16 entries
pub type IvarOffsets = SmallVec<[u64; 16]>;

/// Resolves encoded type names to metadata.
pub trait TypeNameResolver {
    /// Resolves `name` (without terminator).
    ///
    /// `context` is the descriptor of the type that declared the reference and
    /// `generic_args` its generic argument vector, if generic. Returns `None` when the name
    /// cannot be resolved, which callers treat as an unknown layout rather than a fault.
    fn resolve_type(
        &self,
        name: &[u8],
        context: Option<u64>,
        generic_args: Option<u64>,
    ) -> Option<TypeHandle>;
}

/// Queries against the foreign object system.
pub trait ForeignObjectSystem {
    /// Byte offsets of the instance variables of `class`, in declaration order.
    ///
    /// Returns `None` if the class is unknown to the foreign object system.
    fn instance_variable_offsets(&self, class: TypeHandle) -> Option<IvarOffsets>;

    /// Class of the object at `object`.
    fn class_of_instance(&self, image: &Image, object: u64) -> Option<TypeHandle>;
}

/// Bridges foreign classes to native metadata.
pub trait ClassBridge {
    /// Native metadata wrapping the foreign `class`
    fn native_handle_for_foreign_class(&self, class: TypeHandle) -> Option<TypeHandle>;
}

/// Protocol conformance queries.
pub trait ConformanceLookup {
    /// Witness table of `ty` for the protocol described at `protocol`
    fn conforms_to(&self, ty: TypeHandle, protocol: u64) -> Option<u64>;

    /// Descriptor of the equality protocol, if known
    fn equatable_protocol(&self) -> Option<u64>;

    /// Witness table of `ty` for the equality protocol
    fn equatable_witness(&self, ty: TypeHandle) -> Option<u64> {
        self.conforms_to(ty, self.equatable_protocol()?)
    }

    /// Compares the values at `lhs` and `rhs` through the equality witness `witness`.
    ///
    /// Returns `None` if the witness cannot be invoked.
    fn invoke_equals(
        &self,
        image: &Image,
        lhs: u64,
        rhs: u64,
        ty: TypeHandle,
        witness: u64,
    ) -> Option<bool>;
}

/// Every runtime service needed by the introspection algorithms
pub trait Runtime: TypeNameResolver + ForeignObjectSystem + ClassBridge + ConformanceLookup {}

impl<T> Runtime for T where T: TypeNameResolver + ForeignObjectSystem + ClassBridge + ConformanceLookup
{}
