//! Structural value equality.
//!
//! Two values of the same type are equal when:
//!
//! - the runtime knows an equality conformance for the type and it says so, or
//! - the type is trivially copyable and the bytes match, or
//! - every stored element is equal, recursively.
//!
//! Weak and unowned references, native object references and function values are compared
//! by their stored words. Class references compare by identity unless
//! [`ApplyOptions::REQUIRE_CLASS`] asks for the referenced instances to be walked.
//! Existentials compare their dynamic types first and then the projected values.

use tracing::{debug, trace};

use crate::{
    metadata::{
        existential::ExistentialMetadata, function::FunctionMetadata, kind::HeapKindMask,
        kind::MetadataKind, typename::Ownership, TypeHandle,
    },
    visitor::MetadataVisitor,
    walkers::ApplyOptions,
    Introspector, Result,
};

/// Compares the values of type `ty` stored at `lhs` and `rhs`.
///
/// Parts that cannot be introspected make the values unequal, unless
/// [`ApplyOptions::IGNORE_UNKNOWN`] is set, in which case they are skipped.
///
/// # Examples
///
/// ```rust,no_run
/// use metascope::{walkers::{values_equal, ApplyOptions}, Image, Introspector, PointerWidth};
/// use metascope::{metadata::TypeHandle, runtime::RuntimeTables};
///
/// # let image = Image::from_mem(0x1000, vec![0; 64], PointerWidth::Bits64)?;
/// let runtime = RuntimeTables::new();
/// let cx = Introspector::new(&image, &runtime);
///
/// let same = values_equal(&cx, TypeHandle::new(0x1000), 0x1010, 0x1020, ApplyOptions::empty());
/// # Ok::<(), metascope::Error>(())
/// ```
pub fn values_equal(cx: &Introspector<'_>, ty: TypeHandle, lhs: u64, rhs: u64, options: ApplyOptions) -> bool {
    let comparison = Comparison { lhs, rhs, options, depth: 0 };
    comparison.equal(cx, ty)
}

#[derive(Debug, Clone, Copy)]
struct Comparison {
    lhs: u64,
    rhs: u64,
    options: ApplyOptions,
    depth: usize,
}

impl Comparison {
    fn unknown(&self, ty: TypeHandle, reason: &str) -> bool {
        debug!(%ty, lhs = self.lhs, rhs = self.rhs, reason, "equality unknown");
        self.options.contains(ApplyOptions::IGNORE_UNKNOWN)
    }

    /// Comparison of two elements one level deeper
    fn nested(&self, lhs: u64, rhs: u64) -> Self {
        Comparison {
            lhs,
            rhs,
            options: self.options,
            depth: self.depth + 1,
        }
    }

    fn equal(&self, cx: &Introspector<'_>, ty: TypeHandle) -> bool {
        match self.try_equal(cx, ty) {
            Ok(equal) => equal,
            Err(error) => {
                debug!(%ty, %error, "value unreadable");
                self.options.contains(ApplyOptions::IGNORE_UNKNOWN)
            }
        }
    }

    fn try_equal(&self, cx: &Introspector<'_>, ty: TypeHandle) -> Result<bool> {
        if self.depth > cx.config().max_depth {
            return Ok(self.unknown(ty, "nesting exceeds the recursion limit"));
        }
        if self.lhs == self.rhs {
            return Ok(true);
        }

        let runtime = cx.runtime();
        if let Some(witness) = runtime.equatable_witness(ty) {
            trace!(%ty, witness, "equality through conformance");
            return Ok(runtime
                .invoke_equals(cx.image(), self.lhs, self.rhs, ty, witness)
                .unwrap_or(false));
        }

        let kind = ty.kind(cx.image())?;
        let vw = ty.value_witness(cx.image())?;
        if vw.is_pod() && kind != Some(MetadataKind::Existential) {
            return self.bytes_equal(cx, vw.size);
        }
        if matches!(kind, Some(MetadataKind::Enum | MetadataKind::Optional)) {
            return Ok(self.unknown(ty, "enum payloads need their tag"));
        }

        let mut visitor = EqualityVisitor { comparison: *self };
        Ok(cx.visit(ty, &mut visitor))
    }

    fn bytes_equal(&self, cx: &Introspector<'_>, size: u64) -> Result<bool> {
        let image = cx.image();
        let len = usize::try_from(size).map_err(|_| crate::Error::OutOfBounds)?;
        Ok(image.slice(self.lhs, len)? == image.slice(self.rhs, len)?)
    }

    fn words_equal(&self, cx: &Introspector<'_>) -> Result<bool> {
        Ok(cx.image().read_word(self.lhs)? == cx.image().read_word(self.rhs)?)
    }

    /// Walks the instances referenced by both slots.
    fn instances_equal(&self, cx: &Introspector<'_>) -> Result<bool> {
        let image = cx.image();
        let (lhs, rhs) = (image.read_pointer(self.lhs)?, image.read_pointer(self.rhs)?);
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
            return Ok(lhs == rhs);
        };
        if lhs == rhs {
            return Ok(true);
        }

        let runtime = cx.runtime();
        let (Some(class), Some(other)) = (
            runtime.class_of_instance(image, lhs),
            runtime.class_of_instance(image, rhs),
        ) else {
            return Ok(false);
        };
        if class != other {
            return Ok(false);
        }
        if self.depth >= cx.config().max_depth {
            return Ok(self.unknown(class, "instance graph exceeds the recursion limit"));
        }

        let mut visitor = EqualityVisitor {
            comparison: self.nested(lhs, rhs),
        };
        Ok(cx.visit_heap(class, &mut visitor, HeapKindMask::CLASS))
    }
}

/// Compares the elements reported by a walk of one value against the same elements of the
/// other.
struct EqualityVisitor {
    comparison: Comparison,
}

impl EqualityVisitor {
    fn settle(&self, ty: TypeHandle, result: Result<bool>) -> bool {
        result.unwrap_or_else(|error| {
            debug!(%ty, %error, "value unreadable");
            self.unknown_result()
        })
    }
}

impl MetadataVisitor for EqualityVisitor {
    fn unknown_result(&self) -> bool {
        self.comparison.options.contains(ApplyOptions::IGNORE_UNKNOWN)
    }

    fn visit_element(&mut self, cx: &Introspector<'_>, ty: TypeHandle, ownership: Ownership, offset: u64) -> bool {
        let (Some(lhs), Some(rhs)) = (
            self.comparison.lhs.checked_add(offset),
            self.comparison.rhs.checked_add(offset),
        ) else {
            return self.unknown_result();
        };
        let element = self.comparison.nested(lhs, rhs);

        if ownership.is_strong() {
            element.equal(cx, ty)
        } else {
            self.settle(ty, element.words_equal(cx))
        }
    }

    fn visit_class(&mut self, cx: &Introspector<'_>, class: TypeHandle) -> bool {
        if self.comparison.options.contains(ApplyOptions::REQUIRE_CLASS) {
            self.settle(class, self.comparison.instances_equal(cx))
        } else {
            self.settle(class, self.comparison.words_equal(cx))
        }
    }

    fn visit_existential(&mut self, cx: &Introspector<'_>, existential: &ExistentialMetadata) -> bool {
        let ty = existential.handle;
        let Comparison { lhs, rhs, .. } = self.comparison;

        let dynamic = cx.dynamic_type(ty, lhs);
        if dynamic.is_none() {
            return self.comparison.unknown(ty, "dynamic type unavailable");
        }
        if dynamic != cx.dynamic_type(ty, rhs) {
            return false;
        }

        let (Some(dynamic), Some(lhs), Some(rhs)) =
            (dynamic, cx.project_value(ty, lhs), cx.project_value(ty, rhs))
        else {
            return self.comparison.unknown(ty, "container cannot be projected");
        };

        trace!(%ty, %dynamic, "comparing existential payloads");
        self.comparison.nested(lhs, rhs).equal(cx, dynamic)
    }

    fn visit_function(&mut self, cx: &Introspector<'_>, function: &FunctionMetadata) -> bool {
        let size = function
            .handle
            .value_witness(cx.image())
            .map(|vw| vw.size)
            .unwrap_or_else(|_| 2 * cx.image().pointer_size());
        self.settle(function.handle, self.comparison.bytes_equal(cx, size))
    }

    fn visit_native_object(&mut self, cx: &Introspector<'_>, ty: TypeHandle) -> bool {
        self.settle(ty, self.comparison.words_equal(cx))
    }
}
