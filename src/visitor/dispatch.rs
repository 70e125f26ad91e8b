//! Kind dispatch for `visit` and `visit_heap`.

use tracing::debug;

use crate::{
    metadata::{function::FunctionMetadata, kind::HeapKindMask, kind::MetadataKind, TypeHandle},
    visitor::MetadataVisitor,
    Introspector, Result,
};

impl Introspector<'_> {
    /// Walks the value layout of `ty`, reporting its elements to `visitor`.
    ///
    /// Structs, enums, optionals and tuples are enumerated in place. Classes, functions,
    /// existentials and the builtin native object type are reported through their dedicated
    /// callbacks. Everything else is unknown.
    ///
    /// Returns `false` as soon as any callback does.
    pub fn visit<V: MetadataVisitor + ?Sized>(&self, ty: TypeHandle, visitor: &mut V) -> bool {
        self.try_visit(ty, visitor)
            .unwrap_or_else(|error| self.degrade(ty, visitor, &error))
    }

    /// Walks the heap storage described by `ty`, if its kind is selected by `mask`.
    ///
    /// Class instances, closure capture boxes and generic boxes are supported; error boxes
    /// and every other kind are unknown.
    ///
    /// Returns `false` as soon as any callback does.
    pub fn visit_heap<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &mut V,
        mask: HeapKindMask,
    ) -> bool {
        self.try_visit_heap(ty, visitor, mask)
            .unwrap_or_else(|error| self.degrade(ty, visitor, &error))
    }

    fn try_visit<V: MetadataVisitor + ?Sized>(&self, ty: TypeHandle, visitor: &mut V) -> Result<bool> {
        let image = self.image();
        let Some(kind) = ty.kind(image)? else {
            return Ok(self.unknown(ty, visitor, "unrecognised kind"));
        };

        match kind {
            MetadataKind::Class => Ok(visitor.visit_class(self, ty)),
            MetadataKind::Struct => self.visit_struct(ty, visitor),
            MetadataKind::Enum | MetadataKind::Optional => self.visit_enum(ty, visitor),
            MetadataKind::Tuple => self.visit_tuple(ty, visitor),
            MetadataKind::Function => {
                Ok(visitor.visit_function(self, &FunctionMetadata::read(image, ty)?))
            }
            MetadataKind::Existential => Ok(visitor.visit_existential(self, &self.existential(ty)?)),
            MetadataKind::Opaque if self.native_object_type() == Some(ty) => {
                Ok(visitor.visit_native_object(self, ty))
            }
            _ => Ok(self.unknown(ty, visitor, "kind has no value layout")),
        }
    }

    fn try_visit_heap<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &mut V,
        mask: HeapKindMask,
    ) -> Result<bool> {
        match ty.kind(self.image())? {
            Some(MetadataKind::Class) if mask.contains(HeapKindMask::CLASS) => {
                self.visit_heap_class(ty, visitor, 0)
            }
            Some(MetadataKind::HeapLocalVariable) if mask.contains(HeapKindMask::LOCAL) => {
                self.visit_heap_locals(ty, visitor)
            }
            Some(MetadataKind::HeapGenericLocalVariable) if mask.contains(HeapKindMask::GENERIC) => {
                self.visit_heap_box(ty, visitor)
            }
            _ => Ok(self.unknown(ty, visitor, "kind has no heap layout or is masked out")),
        }
    }

    /// Reports an unknown layout for `ty`.
    pub(crate) fn unknown<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &V,
        reason: &str,
    ) -> bool {
        debug!(%ty, reason, "layout unknown");
        visitor.unknown_result()
    }

    /// Reports an unreadable part of `ty`; a lenient visitor skips it and goes on.
    pub(crate) fn degrade<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &V,
        error: &crate::Error,
    ) -> bool {
        debug!(%ty, %error, "layout unreadable");
        visitor.unknown_result()
    }
}
