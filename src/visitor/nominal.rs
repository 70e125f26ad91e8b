//! Value-type walks: structs, enums and tuples.

use tracing::trace;

use crate::{
    metadata::{
        descriptor::ContextDescriptor, fields::FieldDescriptor, nominal::NominalMetadata,
        tuple::TupleMetadata, TypeHandle,
    },
    visitor::MetadataVisitor,
    Introspector, Result,
};

impl Introspector<'_> {
    /// Reports every stored property of a struct, in declaration order.
    pub(crate) fn visit_struct<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &mut V,
    ) -> Result<bool> {
        let image = self.image();
        let meta = NominalMetadata::read(image, ty)?;
        let ContextDescriptor::Struct(desc) = meta.context_descriptor(image)? else {
            return Err(malformed_error!("Struct {} has a non-struct descriptor", ty));
        };

        let Some(fields) = desc.nominal.fields else {
            return Ok(self.unknown(ty, visitor, "struct has no reflection metadata"));
        };
        if desc.field_offset_vector_offset == 0 {
            return Ok(self.unknown(ty, visitor, "struct has no field offset vector"));
        }

        let fields = FieldDescriptor::read(image, fields)?;
        if desc.num_fields > fields.num_fields {
            return Ok(self.unknown(ty, visitor, "struct declares more fields than it describes"));
        }

        for index in 0..desc.num_fields {
            let part = fields.record(image, index).and_then(|record| {
                Ok((record, meta.field_offset(image, desc.field_offset_vector_offset, index)?))
            });
            let (record, offset) = match part {
                Ok(part) => part,
                Err(error) if self.degrade(ty, visitor, &error) => continue,
                Err(_) => return Ok(false),
            };
            trace!(%ty, index, offset, "struct field");

            if !visitor.visit_field(self, ty, &record, offset) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Reports every payload case of an enum or optional, in declaration order.
    ///
    /// Cases without payloads are skipped. Enums without any payload case are opaque.
    pub(crate) fn visit_enum<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &mut V,
    ) -> Result<bool> {
        let image = self.image();
        let meta = NominalMetadata::read(image, ty)?;
        let ContextDescriptor::Enum(desc) = meta.context_descriptor(image)? else {
            return Err(malformed_error!("Enum {} has a non-enum descriptor", ty));
        };

        let Some(fields) = desc.nominal.fields else {
            return Ok(self.unknown(ty, visitor, "enum has no reflection metadata"));
        };
        if desc.num_payload_cases() == 0 {
            return Ok(self.unknown(ty, visitor, "enum has no payload cases"));
        }

        let fields = FieldDescriptor::read(image, fields)?;
        if u64::from(fields.num_fields) != desc.num_cases() {
            return Ok(self.unknown(ty, visitor, "enum case count disagrees with its records"));
        }

        for tag in 0..fields.num_fields {
            let record = match fields.record(image, tag) {
                Ok(record) => record,
                Err(error) if self.degrade(ty, visitor, &error) => continue,
                Err(_) => return Ok(false),
            };
            if !record.has_type() {
                continue;
            }

            trace!(%ty, tag, "enum case");
            if !visitor.visit_case(self, ty, &record, tag) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Reports every typed tuple element with strong ownership.
    pub(crate) fn visit_tuple<V: MetadataVisitor + ?Sized>(
        &self,
        ty: TypeHandle,
        visitor: &mut V,
    ) -> Result<bool> {
        let image = self.image();
        let tuple = TupleMetadata::read(image, ty)?;

        for index in 0..tuple.num_elements {
            let element = match tuple.element(image, index) {
                Ok(element) => element,
                Err(error) if self.degrade(ty, visitor, &error) => continue,
                Err(_) => return Ok(false),
            };
            let Some(element_ty) = element.ty else {
                continue;
            };

            trace!(%ty, index, offset = element.offset, "tuple element");
            if !visitor.visit_tuple_element(self, ty, index, element_ty, element.offset) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
