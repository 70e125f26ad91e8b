//! Visitor-driven metadata walking.
//!
//! Walking a type means discovering its stored elements (struct fields, enum payload cases,
//! tuple elements, class properties across the superclass chain, closure captures) together
//! with their byte offsets, and reporting each one to a [`crate::visitor::MetadataVisitor`].
//! Two entry points exist on [`crate::Introspector`]:
//!
//! - [`crate::Introspector::visit`] walks value layouts in place. Classes, functions,
//!   existentials and native object references are *leaves* of a value walk and are reported
//!   through their own callbacks.
//! - [`crate::Introspector::visit_heap`] walks reference-counted storage: class instances,
//!   closure capture boxes and generic boxes, gated by a [`crate::metadata::kind::HeapKindMask`].
//!
//! # Unknown Layouts
//!
//! Metadata is frequently incomplete: reflection records may be stripped, names may use
//! encodings the runtime cannot resolve, a class may inherit from a foreign object system.
//! None of this is an error for a walker. Every such situation, including unreadable memory,
//! produces a single signal, [`crate::visitor::MetadataVisitor::unknown_result`], whose value
//! the visitor decides. A visitor that returns `true` skips what it cannot see; one that
//! returns `false` (the default) aborts the walk.
//!
//! # Early Exit
//!
//! Any callback returning `false` stops the walk immediately and the entry point returns
//! `false`. Enclosing algorithms never continue after a rejection.
//!
//! # Examples
//!
//! ```rust,ignore
//! use metascope::{visitor::MetadataVisitor, metadata::{TypeHandle, typename::Ownership}};
//!
//! struct Offsets(Vec<u64>);
//!
//! impl MetadataVisitor for Offsets {
//!     fn unknown_result(&self) -> bool {
//!         true
//!     }
//!
//!     fn visit_element(&mut self, _cx: &Introspector<'_>, _ty: TypeHandle, _ownership: Ownership, offset: u64) -> bool {
//!         self.0.push(offset);
//!         true
//!     }
//! }
//! ```

mod class;
mod dispatch;
mod heap;
mod nominal;

use tracing::trace;

use crate::{
    metadata::{
        existential::ExistentialMetadata, fields::FieldRecord, function::FunctionMetadata,
        typename::Ownership, TypeHandle,
    },
    Introspector,
};

/// Callbacks invoked while walking metadata.
///
/// Every callback defaults to [`MetadataVisitor::unknown_result`], except
/// [`MetadataVisitor::visit_field`] (resolves the field type, then calls
/// [`MetadataVisitor::visit_element`]) and [`MetadataVisitor::visit_tuple_element`] (calls
/// [`MetadataVisitor::visit_element`] with strong ownership).
pub trait MetadataVisitor {
    /// Outcome reported for anything that cannot be introspected
    fn unknown_result(&self) -> bool {
        false
    }

    /// A stored element of type `ty` at `offset` bytes into the walked value
    fn visit_element(
        &mut self,
        cx: &Introspector<'_>,
        ty: TypeHandle,
        ownership: Ownership,
        offset: u64,
    ) -> bool {
        let _ = (cx, ty, ownership, offset);
        self.unknown_result()
    }

    /// A stored property of the struct or class `base`, described by `field`
    fn visit_field(
        &mut self,
        cx: &Introspector<'_>,
        base: TypeHandle,
        field: &FieldRecord,
        offset: u64,
    ) -> bool {
        visit_resolved_field(self, cx, base, field, offset)
    }

    /// Element `index` of the tuple `tuple`
    fn visit_tuple_element(
        &mut self,
        cx: &Introspector<'_>,
        tuple: TypeHandle,
        index: u64,
        ty: TypeHandle,
        offset: u64,
    ) -> bool {
        let _ = (tuple, index);
        self.visit_element(cx, ty, Ownership::Strong, offset)
    }

    /// A payload case of the enum `base`; `tag` is the case's declaration index
    fn visit_case(
        &mut self,
        cx: &Introspector<'_>,
        base: TypeHandle,
        case: &FieldRecord,
        tag: u32,
    ) -> bool {
        let _ = (cx, base, case, tag);
        self.unknown_result()
    }

    /// A class reference; class storage is only walked by `visit_heap`
    fn visit_class(&mut self, cx: &Introspector<'_>, class: TypeHandle) -> bool {
        let _ = (cx, class);
        self.unknown_result()
    }

    /// An existential container
    fn visit_existential(&mut self, cx: &Introspector<'_>, existential: &ExistentialMetadata) -> bool {
        let _ = (cx, existential);
        self.unknown_result()
    }

    /// A function value
    fn visit_function(&mut self, cx: &Introspector<'_>, function: &FunctionMetadata) -> bool {
        let _ = (cx, function);
        self.unknown_result()
    }

    /// A builtin native object reference
    fn visit_native_object(&mut self, cx: &Introspector<'_>, ty: TypeHandle) -> bool {
        let _ = (cx, ty);
        self.unknown_result()
    }
}

/// Resolves the type of `field` in the context of `base` and reports it to
/// [`MetadataVisitor::visit_element`] with its decoded ownership.
///
/// This is the default behaviour of [`MetadataVisitor::visit_field`], exposed so that
/// visitors overriding it can fall back to it.
pub fn visit_resolved_field<V: MetadataVisitor + ?Sized>(
    visitor: &mut V,
    cx: &Introspector<'_>,
    base: TypeHandle,
    field: &FieldRecord,
    offset: u64,
) -> bool {
    let Some(name) = field.mangled_type_name else {
        return visitor.unknown_result();
    };

    match cx.resolve(base, name) {
        Ok(Some(resolved)) => {
            trace!(%base, offset, ty = %resolved.ty, ownership = %resolved.ownership, "field");
            visitor.visit_element(cx, resolved.ty, resolved.ownership, offset)
        }
        Ok(None) => visitor.unknown_result(),
        Err(error) => {
            tracing::debug!(%base, %error, "field type unreadable");
            visitor.unknown_result()
        }
    }
}
