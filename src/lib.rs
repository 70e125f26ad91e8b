// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'image/physical.rs' uses mmap to map a file into memory

//! # metascope
//!
//! Runtime type-metadata introspection for a managed, reference-counted runtime.
//!
//! Every type the runtime knows about is described by a block of metadata in memory: a kind
//! tag, a pointer to the type's value-witness table (size, alignment, triviality) and
//! kind-specific data such as a field offset vector or a list of tuple elements. Nominal types
//! point at a context descriptor carrying their name and reflection records. `metascope`
//! reads these structures out of an [`Image`] (a memory dump, a mapped file, or a synthetic
//! buffer) and walks them to discover where each stored value lives.
//!
//! ## Features
//!
//! - **Struct, tuple, enum and optional layouts** - stored properties, elements and payload
//!   cases with their byte offsets
//! - **Class instances** - superclass-first field walks, including classes whose offsets are
//!   owned by a foreign object system and classes behind resilient superclasses
//! - **Heap boxes** - closure capture boxes and single-value generic boxes
//! - **Existential containers** - payload projection and dynamic type recovery
//! - **32- and 64-bit images** - the pointer width is a property of the image
//! - **Never panics on bad input** - truncated or crafted metadata degrades to "unknown"
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metascope::{
//!     metadata::TypeHandle, runtime::RuntimeTables, walkers::{collect_fields, ApplyOptions},
//!     Image, Introspector, PointerWidth,
//! };
//! use std::path::Path;
//!
//! let image = Image::from_file(Path::new("metadata.dump"), 0x1_0000_0000, PointerWidth::Bits64)?;
//! let runtime = RuntimeTables::new();
//! let cx = Introspector::new(&image, &runtime);
//!
//! if let Some(fields) = collect_fields(&cx, TypeHandle::new(0x1_0000_4000), ApplyOptions::empty()) {
//!     for field in fields {
//!         println!("{} @ {}", field.name, field.offset);
//!     }
//! }
//! # Ok::<(), metascope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`image`] - Bounds-checked access to target memory, and a builder for synthetic images
//! - [`metadata`] - Typed views over metadata, descriptors and reflection records
//! - [`runtime`] - The services a walk needs from the runtime (name resolution, foreign
//!   object queries, class bridging, conformances) and a table-backed implementation
//! - [`visitor`] - The [`visitor::MetadataVisitor`] trait and the `visit` / `visit_heap`
//!   dispatch on [`Introspector`]
//! - [`walkers`] - Field enumeration and structural equality built on the visitor
//! - [`Error`] and [`Result`] - Error handling for the image and descriptor layers
//!
//! ## Error Handling
//!
//! Reading metadata returns [`Result`]. Walks do not: anything that cannot be read or
//! understood is reported to the visitor through
//! [`visitor::MetadataVisitor::unknown_result`], and the reason is logged through `tracing`
//! at debug level.
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! cargo +nightly fuzz run enumerate --release
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

pub mod config;
pub mod image;
pub mod metadata;
pub mod runtime;
pub mod utils;
pub mod visitor;
pub mod walkers;

mod introspector;

/// `metascope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `metascope` Error type
///
/// # Examples
///
/// ```rust
/// use metascope::{Error, Image, PointerWidth};
///
/// match Image::from_mem(0x1000, Vec::new(), PointerWidth::Bits64) {
///     Err(Error::Empty) => println!("nothing to read"),
///     Err(e) => println!("Error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;

pub use config::IntrospectorConfig;
pub use image::{Image, ImageBuilder, PointerWidth};
pub use introspector::{Introspector, ResolvedType, NATIVE_OBJECT_NAME, RAW_POINTER_NAME};
