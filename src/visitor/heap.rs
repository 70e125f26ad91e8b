//! Capture box and generic box walks.

use tracing::trace;

use crate::{
    metadata::{
        heap::{GenericBoxMetadata, HeapLocalMetadata},
        typename::Ownership,
        TypeHandle,
    },
    utils::align_up,
    visitor::MetadataVisitor,
    Introspector, Result,
};

impl Introspector<'_> {
    /// Reports the generic bindings, then the captured values, of a closure capture box.
    ///
    /// Bindings are metadata pointers stored at the head of the box and are reported as raw
    /// pointers with unowned-unsafe ownership. Boxes that need metadata sources to substitute
    /// generic captures are unknown.
    pub(crate) fn visit_heap_locals<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &mut V,
    ) -> Result<bool> {
        let image = self.image();
        let meta = HeapLocalMetadata::read(image, ty)?;
        let Some(desc) = meta.capture_descriptor(image)? else {
            return Ok(self.unknown(ty, visitor, "capture box has no descriptor"));
        };
        if desc.num_metadata_sources != 0 {
            return Ok(self.unknown(ty, visitor, "capture box needs metadata sources"));
        }

        let word = image.pointer_size();
        let mut offset = meta.first_capture_offset(image);

        if desc.num_bindings > 0 {
            let Some(pointer) = self.raw_pointer_type() else {
                return Ok(self.unknown(ty, visitor, "raw pointer type unavailable"));
            };
            for index in 0..desc.num_bindings {
                trace!(%ty, index, offset, "capture binding");
                if !visitor.visit_element(self, pointer, Ownership::UnownedUnsafe, offset) {
                    return Ok(false);
                }
                let Some(next) = offset.checked_add(word) else {
                    return Ok(self.unknown(ty, visitor, "capture binding offset overflows"));
                };
                offset = next;
            }
        }

        for index in 0..desc.num_capture_types {
            let Some(name) = desc.capture_type(image, index)? else {
                return Ok(self.unknown(ty, visitor, "capture has no type name"));
            };
            let Some(capture) = self.resolve(ty, name)? else {
                return Ok(self.unknown(ty, visitor, "capture type did not resolve"));
            };

            let vw = capture.ty.value_witness(image)?;
            offset = align_up(offset, vw.alignment_mask());
            trace!(%ty, index, offset, capture = %capture.ty, "capture");
            if !visitor.visit_element(self, capture.ty, capture.ownership, offset) {
                return Ok(false);
            }
            let Some(next) = offset.checked_add(vw.size) else {
                return Ok(self.unknown(ty, visitor, "capture size overflows"));
            };
            offset = next;
        }

        Ok(true)
    }

    /// Reports the single value held by a generic box.
    pub(crate) fn visit_heap_box<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &mut V,
    ) -> Result<bool> {
        let image = self.image();
        let meta = GenericBoxMetadata::read(image, ty)?;
        let Some(boxed) = meta.boxed_type else {
            return Ok(self.unknown(ty, visitor, "generic box has no type"));
        };

        let offset = align_up(u64::from(meta.offset), boxed.value_witness(image)?.alignment_mask());
        trace!(%ty, offset, boxed = %boxed, "boxed value");
        Ok(visitor.visit_element(self, boxed, Ownership::Strong, offset))
    }
}
