//! Class instance walks.
//!
//! Stored properties are reported superclass first, so offsets arrive in ascending order for
//! ordinary hierarchies. Native classes take their offsets from the field offset vector.
//! Classes with foreign heritage ask the foreign object system, since their vector is not
//! kept up to date when a resilient base class grows.

use tracing::trace;

use crate::{
    metadata::{
        class::{AnyClassMetadata, ClassMetadata},
        descriptor::ClassDescriptor,
        fields::FieldDescriptor,
        kind::MetadataKind,
        TypeHandle,
    },
    runtime::IvarOffsets,
    visitor::MetadataVisitor,
    Error, Introspector, Result,
};

impl Introspector<'_> {
    /// Reports every stored property of a class instance, superclasses first.
    pub(crate) fn visit_heap_class<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &mut V,
        depth: usize,
    ) -> Result<bool> {
        if depth > self.config().max_depth {
            return Err(Error::RecursionLimit(self.config().max_depth));
        }

        let image = self.image();
        let Some(class) = AnyClassMetadata::read(image, ty)?.native(image)? else {
            return Ok(self.unknown(ty, visitor, "class is not native"));
        };
        let Some(desc) = class.class_descriptor(image)? else {
            return Ok(self.unknown(ty, visitor, "class has no descriptor"));
        };

        // Root classes of the foreign hierarchy have no superclass type and are skipped.
        if desc.superclass_type.is_some() {
            if let Some(superclass) = class.header.superclass {
                if !self.visit_superclass(superclass, visitor, depth)? {
                    return Ok(false);
                }
            }
        }

        let Some(fields) = desc.nominal.fields else {
            return Ok(true);
        };
        let fields = FieldDescriptor::read(image, fields)?;
        if fields.num_fields == 0 {
            return Ok(true);
        }
        if fields.num_fields != desc.num_fields {
            return Ok(self.unknown(ty, visitor, "class field count disagrees with its records"));
        }

        let offsets = self.class_field_offsets(&class, &desc, fields.num_fields)?;
        let Some(offsets) = offsets.filter(|offsets| offsets.first().is_some_and(|&o| o != 0))
        else {
            return Ok(self.unknown(ty, visitor, "class field offsets unavailable"));
        };

        for (index, offset) in (0..fields.num_fields).zip(offsets) {
            let record = match fields.record(image, index) {
                Ok(record) => record,
                Err(error) if self.degrade(ty, visitor, &error) => continue,
                Err(_) => return Ok(false),
            };
            trace!(%ty, index, offset, depth, "class field");

            if !visitor.visit_field(self, ty, &record, offset) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Walks the superclass of a class at `depth`.
    ///
    /// An unreadable or non-native superclass is one unknown part: a lenient visitor goes on
    /// to the subclass fields. Exceeding the depth limit aborts the whole walk.
    fn visit_superclass<V: MetadataVisitor + ?Sized>(
        &self,
        superclass: TypeHandle,
        visitor: &mut V,
        depth: usize,
    ) -> Result<bool> {
        let walked = match superclass.kind(self.image()) {
            Ok(Some(MetadataKind::Class)) => self.visit_heap_class(superclass, visitor, depth + 1),
            Ok(_) => Ok(self.unknown(superclass, visitor, "superclass is not a class")),
            Err(error) => Err(error),
        };

        match walked {
            Err(error @ Error::RecursionLimit(_)) => Err(error),
            Err(error) => Ok(self.degrade(superclass, visitor, &error)),
            walked => walked,
        }
    }

    fn class_field_offsets(
        &self,
        class: &ClassMetadata,
        desc: &ClassDescriptor,
        count: u32,
    ) -> Result<Option<IvarOffsets>> {
        if class.uses_swift_refcounting() {
            let Some(fovo) = desc.field_offset_vector_words(self.image())? else {
                return Ok(None);
            };
            return (0..count)
                .map(|index| class.field_offset(self.image(), fovo, index))
                .collect::<Result<IvarOffsets>>()
                .map(Some);
        }

        let offsets = self
            .runtime()
            .instance_variable_offsets(class.handle())
            .filter(|offsets| offsets.len() == count as usize);
        trace!(class = %class.handle(), found = offsets.is_some(), "foreign ivar offsets");
        Ok(offsets)
    }
}
