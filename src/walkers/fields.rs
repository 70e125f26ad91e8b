//! Named stored-property enumeration.

use tracing::{debug, trace};

use crate::{
    metadata::{fields::FieldRecord, kind::HeapKindMask, kind::MetadataKind, typename::Ownership, TypeHandle},
    visitor::MetadataVisitor,
    walkers::ApplyOptions,
    Introspector,
};

/// A stored property discovered by [`collect_fields`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Declared name; the label or index for tuple elements
    pub name: String,
    /// Byte offset from the start of the value or instance
    pub offset: u64,
    /// Type of the property
    pub ty: TypeHandle,
    /// Ownership of the reference
    pub ownership: Ownership,
}

/// Calls `callback(name, offset, type)` for every stored property of `ty`.
///
/// Value types (structs, tuples, enums and optionals) are walked in place and require
/// [`ApplyOptions::REQUIRE_CLASS`] to be unset; classes are walked through their instance layout
/// and require it to be set. Any other kind, or a mismatched option, yields `false` without
/// invoking the callback.
///
/// Tuple elements are named by their label, or by their index when unlabelled. Enum payload
/// cases are reported at offset 0, since payloads share storage.
///
/// Returns `true` if every property was visited and the callback accepted all of them.
/// Properties whose type cannot be resolved fail the walk unless
/// [`ApplyOptions::IGNORE_UNKNOWN`] is set, in which case they are skipped.
///
/// # Examples
///
/// ```rust,no_run
/// use metascope::{walkers::{enumerate_fields, ApplyOptions}, Image, Introspector, PointerWidth};
/// use metascope::{metadata::TypeHandle, runtime::RuntimeTables};
///
/// # let image = Image::from_mem(0x1000, vec![0; 64], PointerWidth::Bits64)?;
/// let runtime = RuntimeTables::new();
/// let cx = Introspector::new(&image, &runtime);
///
/// enumerate_fields(&cx, TypeHandle::new(0x1000), ApplyOptions::empty(), |name, offset, ty| {
///     println!("{name} @ {offset}: {ty}");
///     true
/// });
/// # Ok::<(), metascope::Error>(())
/// ```
pub fn enumerate_fields<F>(cx: &Introspector<'_>, ty: TypeHandle, options: ApplyOptions, callback: F) -> bool
where
    F: FnMut(&str, u64, TypeHandle) -> bool,
{
    let mut callback = callback;
    let mut visitor = FieldVisitor::new(options, |name, offset, ty, _| callback(name, offset, ty));
    walk(cx, ty, options, &mut visitor)
}

/// Collects the stored properties of `ty`, as [`enumerate_fields`] reports them.
///
/// Returns `None` if the walk fails.
pub fn collect_fields(cx: &Introspector<'_>, ty: TypeHandle, options: ApplyOptions) -> Option<Vec<FieldInfo>> {
    let mut fields = Vec::new();
    let mut visitor = FieldVisitor::new(options, |name, offset, ty, ownership| {
        fields.push(FieldInfo {
            name: name.to_owned(),
            offset,
            ty,
            ownership,
        });
        true
    });

    walk(cx, ty, options, &mut visitor).then_some(fields)
}

/// Resolves the type of a field or payload case in the context of `base`.
fn resolve_record(cx: &Introspector<'_>, base: TypeHandle, record: &FieldRecord) -> Option<(String, TypeHandle, Ownership)> {
    let name = match record.name(cx.image()) {
        Ok(name) => String::from_utf8_lossy(name.unwrap_or_default()).into_owned(),
        Err(error) => {
            debug!(%base, %error, "field name unreadable");
            return None;
        }
    };

    let resolved = match cx.resolve(base, record.mangled_type_name?) {
        Ok(resolved) => resolved?,
        Err(error) => {
            debug!(%base, field = %name, %error, "field type unreadable");
            return None;
        }
    };

    Some((name, resolved.ty, resolved.ownership))
}

fn tuple_element_name(cx: &Introspector<'_>, tuple: TypeHandle, index: u64) -> String {
    let label = crate::metadata::tuple::TupleMetadata::read(cx.image(), tuple)
        .and_then(|meta| meta.labels(cx.image()))
        .ok()
        .and_then(|labels| {
            usize::try_from(index)
                .ok()
                .and_then(|index| labels.get(index).copied())
        })
        .filter(|label| !label.is_empty());

    match label {
        Some(label) => String::from_utf8_lossy(label).into_owned(),
        None => index.to_string(),
    }
}

/// Reports named properties to `report`, resolving field and case types on the way.
struct FieldVisitor<F> {
    options: ApplyOptions,
    report: F,
}

impl<F> FieldVisitor<F>
where
    F: FnMut(&str, u64, TypeHandle, Ownership) -> bool,
{
    fn new(options: ApplyOptions, report: F) -> Self {
        FieldVisitor { options, report }
    }
}

impl<F> MetadataVisitor for FieldVisitor<F>
where
    F: FnMut(&str, u64, TypeHandle, Ownership) -> bool,
{
    fn unknown_result(&self) -> bool {
        self.options.contains(ApplyOptions::IGNORE_UNKNOWN)
    }

    fn visit_field(&mut self, cx: &Introspector<'_>, base: TypeHandle, field: &FieldRecord, offset: u64) -> bool {
        match resolve_record(cx, base, field) {
            Some((name, ty, ownership)) => {
                trace!(%base, field = %name, offset, "enumerated field");
                (self.report)(&name, offset, ty, ownership)
            }
            None => self.unknown_result(),
        }
    }

    fn visit_tuple_element(
        &mut self,
        cx: &Introspector<'_>,
        tuple: TypeHandle,
        index: u64,
        ty: TypeHandle,
        offset: u64,
    ) -> bool {
        let name = tuple_element_name(cx, tuple, index);
        (self.report)(&name, offset, ty, Ownership::Strong)
    }

    fn visit_case(&mut self, cx: &Introspector<'_>, base: TypeHandle, case: &FieldRecord, tag: u32) -> bool {
        match resolve_record(cx, base, case) {
            Some((name, ty, ownership)) => {
                trace!(%base, case = %name, tag, "enumerated case");
                (self.report)(&name, 0, ty, ownership)
            }
            None => self.unknown_result(),
        }
    }
}

/// Runs `visitor` over `ty` if its kind matches the class selection in `options`.
fn walk<V: MetadataVisitor>(cx: &Introspector<'_>, ty: TypeHandle, options: ApplyOptions, visitor: &mut V) -> bool {
    let class = options.contains(ApplyOptions::REQUIRE_CLASS);

    match ty.kind(cx.image()) {
        Ok(Some(
            MetadataKind::Struct | MetadataKind::Tuple | MetadataKind::Enum | MetadataKind::Optional,
        )) if !class => cx.visit(ty, visitor),
        Ok(Some(MetadataKind::Class)) if class => cx.visit_heap(ty, visitor, HeapKindMask::CLASS),
        Ok(kind) => {
            debug!(%ty, ?kind, ?options, "kind not enumerable with these options");
            false
        }
        Err(error) => {
            debug!(%ty, %error, "kind unreadable");
            false
        }
    }
}
