//! Ready-made walks built on [`crate::visitor::MetadataVisitor`].
//!
//! - [`enumerate_fields`] and [`collect_fields`] list the named stored properties of a type,
//!   the way a reflection API would.
//! - [`values_equal`] compares two values of the same type structurally, dispatching to
//!   equality conformances where the runtime knows one.
//!
//! Both are driven by [`ApplyOptions`], which selects between value and class walks and
//! decides whether parts that cannot be introspected abort the walk or are skipped.

mod equality;
mod fields;

pub use equality::values_equal;
pub use fields::{collect_fields, enumerate_fields, FieldInfo};

use bitflags::bitflags;

bitflags! {
    /// Options for [`enumerate_fields`], [`collect_fields`] and [`values_equal`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ApplyOptions: u32 {
        /// Walk the instance layout of a class instead of a value type.
        ///
        /// For [`values_equal`], class references are compared by walking the referenced
        /// instances instead of by identity.
        const REQUIRE_CLASS = 1 << 0;
        /// Skip parts that cannot be introspected instead of failing the walk
        const IGNORE_UNKNOWN = 1 << 1;
    }
}
