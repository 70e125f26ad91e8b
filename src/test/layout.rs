//! Emits runtime metadata layouts into a test image.
//!
//! [`LayoutBuilder`] wraps an [`ImageBuilder`] and knows how the runtime lays out value
//! witness tables, nominal metadata, descriptors and reflection records. Every type it emits is
//! registered by name, so [`LayoutBuilder::build_with_runtime`] can hand back a stub runtime
//! that resolves the encoded names used in field records.

use std::collections::HashMap;

use crate::{
    metadata::{
        class::ClassFlags,
        descriptor::{ClassDescriptorFlags, ContextFlags, ContextKind},
        fields::{FIELD_DESCRIPTOR_HEADER_SIZE, FIELD_RECORD_SIZE},
        function::FUNCTION_HAS_PARAM_FLAGS,
        heap::{CAPTURE_DESCRIPTOR_HEADER_SIZE, CAPTURE_TYPE_SIZE, METADATA_SOURCE_SIZE},
        kind::MetadataKind,
        typename::Ownership,
        valuewitness::{ValueWitnessFlags, VALUE_WITNESS_FUNCTION_COUNT},
        TypeHandle,
    },
    test::runtime::StubRuntime,
    utils::align_up,
    Image, ImageBuilder, PointerWidth,
};

/// Base address of every test image; low enough for 32-bit images
pub const IMAGE_BASE: u64 = 0x10_0000;

/// Size, alignment mask and triviality of an emitted type
#[derive(Debug, Clone, Copy)]
struct Layout {
    size: u64,
    mask: u64,
    pod: bool,
}

/// Bookkeeping for emitted native classes
#[derive(Debug, Clone, Copy)]
struct ClassInfo {
    name: u64,
    descriptor: u64,
    members_end: u64,
    instance_size: u64,
}

/// A struct declaration
#[derive(Debug, Clone, Default)]
pub struct StructSpec {
    name: String,
    fields: Vec<(String, String)>,
    generic: u64,
    stripped: bool,
    without_offsets: bool,
    dangling_fields: bool,
    non_pod: bool,
}

impl StructSpec {
    pub fn new(name: &str) -> Self {
        StructSpec {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// Adds a stored property with encoded type name `ty`
    pub fn field(mut self, name: &str, ty: &str) -> Self {
        self.fields.push((name.to_owned(), ty.to_owned()));
        self
    }

    /// Declares `count` generic parameters
    pub fn generic(mut self, count: u64) -> Self {
        self.generic = count;
        self
    }

    /// Omits the reflection field descriptor
    pub fn stripped(mut self) -> Self {
        self.stripped = true;
        self
    }

    /// Omits the field offset vector
    pub fn without_offsets(mut self) -> Self {
        self.without_offsets = true;
        self
    }

    /// Points the reflection reference outside the image
    pub fn dangling_fields(mut self) -> Self {
        self.dangling_fields = true;
        self
    }

    /// Marks the struct as needing more than a bitwise copy
    pub fn non_pod(mut self) -> Self {
        self.non_pod = true;
        self
    }
}

/// An enum declaration
#[derive(Debug, Clone, Default)]
pub struct EnumSpec {
    name: String,
    cases: Vec<(String, Option<String>)>,
}

impl EnumSpec {
    pub fn new(name: &str) -> Self {
        EnumSpec {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// Adds a case carrying a payload of encoded type `ty`
    pub fn payload(mut self, name: &str, ty: &str) -> Self {
        self.cases.push((name.to_owned(), Some(ty.to_owned())));
        self
    }

    /// Adds a case without payload
    pub fn empty(mut self, name: &str) -> Self {
        self.cases.push((name.to_owned(), None));
        self
    }
}

/// A class declaration
#[derive(Debug, Clone, Default)]
pub struct ClassSpec {
    name: String,
    superclass: Option<TypeHandle>,
    fields: Vec<(String, String)>,
    generic: u64,
    foreign_refcounting: bool,
    resilient: bool,
    first_offset: Option<u64>,
    declared_fields: Option<u32>,
}

impl ClassSpec {
    pub fn new(name: &str) -> Self {
        ClassSpec {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn superclass(mut self, superclass: TypeHandle) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Adds a stored property with encoded type name `ty`
    pub fn field(mut self, name: &str, ty: &str) -> Self {
        self.fields.push((name.to_owned(), ty.to_owned()));
        self
    }

    /// Declares `count` generic parameters
    pub fn generic(mut self, count: u64) -> Self {
        self.generic = count;
        self
    }

    /// Clears the native reference counting flag, as for classes with foreign heritage
    pub fn foreign_refcounting(mut self) -> Self {
        self.foreign_refcounting = true;
        self
    }

    /// Places members behind a resilient bounds cache
    pub fn resilient(mut self) -> Self {
        self.resilient = true;
        self
    }

    /// Overrides the first entry of the field offset vector
    pub fn first_offset(mut self, offset: u64) -> Self {
        self.first_offset = Some(offset);
        self
    }

    /// Overrides the field count recorded in the class descriptor
    pub fn declared_fields(mut self, count: u32) -> Self {
        self.declared_fields = Some(count);
        self
    }
}

/// A closure capture box
#[derive(Debug, Clone, Default)]
pub struct CaptureSpec {
    bindings: u32,
    captures: Vec<String>,
    metadata_sources: u32,
    first_capture: u32,
}

impl CaptureSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(mut self, count: u32) -> Self {
        self.bindings = count;
        self
    }

    /// Adds a capture with encoded type name `ty`
    pub fn capture(mut self, ty: &str) -> Self {
        self.captures.push(ty.to_owned());
        self
    }

    pub fn metadata_sources(mut self, count: u32) -> Self {
        self.metadata_sources = count;
        self
    }

    pub fn first_capture(mut self, offset: u32) -> Self {
        self.first_capture = offset;
        self
    }
}

/// Emits metadata layouts for tests.
pub struct LayoutBuilder {
    builder: ImageBuilder,
    names: Vec<(String, TypeHandle)>,
    layouts: HashMap<TypeHandle, Layout>,
    classes: HashMap<TypeHandle, ClassInfo>,
    metaclass: u64,
    class_witness: u64,
}

impl LayoutBuilder {
    pub fn new(width: PointerWidth) -> Self {
        let mut builder = ImageBuilder::new(IMAGE_BASE, width);
        let metaclass = builder.alloc_words(8);

        let mut layout = LayoutBuilder {
            builder,
            names: Vec::new(),
            layouts: HashMap::new(),
            classes: HashMap::new(),
            metaclass,
            class_witness: 0,
        };
        let word = layout.word();
        layout.class_witness = layout.value_witness(word, word - 1, ValueWitnessFlags::IS_NON_POD.bits());
        layout
    }

    fn word(&self) -> u64 {
        self.builder.pointer_size()
    }

    pub fn build(self) -> Image {
        self.builder.build().expect("test image")
    }

    /// Builds the image and a stub runtime resolving every registered name
    pub fn build_with_runtime(self) -> (Image, StubRuntime) {
        let runtime = StubRuntime::new();
        for (name, handle) in &self.names {
            runtime.tables().register_type(name.as_bytes(), *handle);
        }
        (self.build(), runtime)
    }

    pub fn alloc_words(&mut self, count: u64) -> u64 {
        self.builder.alloc_words(count as usize)
    }

    /// Allocates a NUL-terminated encoded name
    pub fn alloc_name(&mut self, name: &str) -> u64 {
        self.builder.alloc_c_str(name.as_bytes())
    }

    pub fn write_word(&mut self, address: u64, value: u64) {
        self.builder.write_word(address, value).expect("word");
    }

    fn write_u32(&mut self, address: u64, value: u32) {
        self.builder.write_u32(address, value).expect("u32");
    }

    fn write_name(&mut self, field: u64, name: Option<&str>) {
        let target = name.map(|name| self.alloc_name(name));
        self.builder.write_relative_str(field, target).expect("name reference");
    }

    /// Makes `name` resolve to `handle`
    pub fn register(&mut self, name: &str, handle: TypeHandle) {
        self.names.push((name.to_owned(), handle));
    }

    fn layout_of_name(&self, name: &str) -> Layout {
        let word = self.word();
        let fallback = Layout {
            size: word,
            mask: word - 1,
            pod: true,
        };

        let base = match Ownership::from_encoded_name(name.as_bytes()) {
            Ownership::Strong => name,
            _ => &name[..name.len() - 2],
        };
        self.names
            .iter()
            .rev()
            .find(|(registered, _)| registered == base)
            .and_then(|(_, handle)| self.layouts.get(handle))
            .copied()
            .unwrap_or(fallback)
    }

    /// Lays out `fields` sequentially from `start`, returning each offset and the end
    fn lay_out(&self, start: u64, fields: &[(String, String)]) -> (Vec<u64>, Layout) {
        let mut offset = start;
        let mut layout = Layout {
            size: 0,
            mask: 0,
            pod: true,
        };
        let offsets = fields
            .iter()
            .map(|(_, ty)| {
                let field = self.layout_of_name(ty);
                offset = align_up(offset, field.mask);
                let at = offset;
                offset += field.size;
                layout.mask = layout.mask.max(field.mask);
                layout.pod &= field.pod;
                at
            })
            .collect();
        layout.size = offset;
        (offsets, layout)
    }

    /// Emits a value witness table and returns its address
    fn value_witness(&mut self, size: u64, mask: u64, flags: u32) -> u64 {
        let table = self.alloc_words(VALUE_WITNESS_FUNCTION_COUNT + 4);
        let summary = table + VALUE_WITNESS_FUNCTION_COUNT * self.word();
        let word = self.word();
        self.write_word(summary, size);
        self.write_word(summary + word, align_up(size.max(1), mask));
        self.write_u32(summary + 2 * word, flags | mask as u32);
        table
    }

    /// Allocates metadata of `words` words preceded by a witness table slot
    fn metadata(&mut self, kind: u64, witness: Option<u64>, words: u64) -> TypeHandle {
        let block = self.alloc_words(words + 1);
        let handle = block + self.word();
        self.write_word(block, witness.unwrap_or(0));
        self.write_word(handle, kind);
        TypeHandle::new(handle)
    }

    fn typed_metadata(&mut self, kind: MetadataKind, layout: Layout, words: u64) -> TypeHandle {
        let flags = if layout.pod { 0 } else { ValueWitnessFlags::IS_NON_POD.bits() };
        let witness = self.value_witness(layout.size, layout.mask, flags);
        let handle = self.metadata(kind.raw(), Some(witness), words);
        self.layouts.insert(handle, layout);
        handle
    }

    /// Metadata with an arbitrary kind word and no witness table
    pub fn raw_metadata(&mut self, kind: u64) -> TypeHandle {
        self.metadata(kind, None, 4)
    }

    /// An opaque type with the given layout; `flags` are extra witness flags
    pub fn opaque_type(&mut self, size: u64, mask: u64, flags: u32) -> TypeHandle {
        let witness = self.value_witness(size, mask, flags);
        let handle = self.metadata(MetadataKind::Opaque.raw(), Some(witness), 1);
        self.layouts.insert(
            handle,
            Layout {
                size,
                mask,
                pod: flags & ValueWitnessFlags::IS_NON_POD.bits() == 0,
            },
        );
        handle
    }

    /// The word-sized integer, registered as `Si`
    pub fn builtin_int(&mut self) -> TypeHandle {
        let word = self.word();
        let int = self.opaque_type(word, word - 1, 0);
        self.register("Si", int);
        int
    }

    /// A word-sized builtin registered under `name`; native object references are
    /// reference counted
    pub fn builtin(&mut self, name: &str) -> TypeHandle {
        let word = self.word();
        let flags = if name == "Bo" {
            ValueWitnessFlags::IS_NON_POD.bits()
        } else {
            0
        };
        let ty = self.opaque_type(word, word - 1, flags);
        self.register(name, ty);
        ty
    }

    pub fn tuple(&mut self, elements: &[(Option<TypeHandle>, u64)], labels: Option<&str>) -> TypeHandle {
        let word = self.word();
        let mut layout = Layout {
            size: 0,
            mask: 0,
            pod: true,
        };
        for (ty, offset) in elements {
            let element = ty
                .and_then(|ty| self.layouts.get(&ty).copied())
                .unwrap_or(Layout {
                    size: word,
                    mask: word - 1,
                    pod: true,
                });
            layout.size = layout.size.max(offset + element.size);
            layout.mask = layout.mask.max(element.mask);
            layout.pod &= element.pod;
        }

        let count = elements.len() as u64;
        let handle = self.typed_metadata(MetadataKind::Tuple, layout, 3 + 2 * count);
        let base = handle.address();
        self.write_word(base + word, count);
        self.write_name(base + 2 * word, labels);
        for (index, (ty, offset)) in elements.iter().enumerate() {
            let entry = base + (3 + 2 * index as u64) * word;
            self.write_word(entry, ty.map_or(0, TypeHandle::address));
            self.write_word(entry + word, *offset);
        }
        handle
    }

    /// Emits a field descriptor with one record per `(name, type)` entry
    fn field_descriptor(&mut self, owner: &str, kind: u16, records: &[(String, Option<String>)]) -> u64 {
        let size = FIELD_DESCRIPTOR_HEADER_SIZE + FIELD_RECORD_SIZE * records.len() as u64;
        let descriptor = self.builder.alloc(size as usize, 4);
        self.write_name(descriptor, Some(owner));
        self.builder.write_u16(descriptor + 8, kind).expect("kind");
        self.builder
            .write_u16(descriptor + 10, FIELD_RECORD_SIZE as u16)
            .expect("record size");
        self.write_u32(descriptor + 12, records.len() as u32);

        for (index, (name, ty)) in records.iter().enumerate() {
            let record = descriptor + FIELD_DESCRIPTOR_HEADER_SIZE + FIELD_RECORD_SIZE * index as u64;
            self.write_u32(record, 0x2);
            self.write_name(record + 4, ty.as_deref());
            self.write_name(record + 8, Some(name));
        }
        descriptor
    }

    /// Emits the nominal part of a descriptor: flags, name and reflection reference
    fn nominal_descriptor(&mut self, kind: ContextKind, kind_flags: u16, generic: bool, name: &str, size: u64) -> u64 {
        let descriptor = self.builder.alloc(size as usize, 4);
        let mut flags = kind.raw() | (u32::from(kind_flags) << 16);
        if generic {
            flags |= ContextFlags::IS_GENERIC.bits();
        }
        self.write_u32(descriptor, flags);
        self.write_name(descriptor + 8, Some(name));
        descriptor
    }

    fn link_fields(&mut self, descriptor: u64, fields: u64) {
        self.builder
            .write_relative(descriptor + 16, Some(fields))
            .expect("fields reference");
    }

    pub fn structure(&mut self, spec: StructSpec) -> TypeHandle {
        let word = self.word();
        let (offsets, mut layout) = self.lay_out(0, &spec.fields);
        layout.pod &= !spec.non_pod;

        let descriptor = self.nominal_descriptor(ContextKind::Struct, 0, spec.generic > 0, &spec.name, 28);
        let records: Vec<_> = spec
            .fields
            .iter()
            .map(|(name, ty)| (name.clone(), Some(ty.clone())))
            .collect();
        if spec.dangling_fields {
            self.builder
                .write_i32(descriptor + 16, 0x0100_0000)
                .expect("fields reference");
        } else if !spec.stripped {
            let fields = self.field_descriptor(&spec.name, 0, &records);
            self.link_fields(descriptor, fields);
        }

        let fovo = 2 + spec.generic;
        let vector_words = (4 * offsets.len() as u64).div_ceil(word);
        self.write_u32(descriptor + 20, offsets.len() as u32);
        self.write_u32(descriptor + 24, if spec.without_offsets { 0 } else { fovo as u32 });

        let handle = self.typed_metadata(MetadataKind::Struct, layout, fovo + vector_words);
        self.write_word(handle.address() + word, descriptor);
        let vector = handle.address() + fovo * word;
        for (index, offset) in offsets.iter().enumerate() {
            self.write_u32(vector + 4 * index as u64, *offset as u32);
        }

        self.register(&spec.name, handle);
        handle
    }

    pub fn enumeration(&mut self, spec: EnumSpec) -> TypeHandle {
        let word = self.word();
        let mut layout = Layout {
            size: 0,
            mask: 0,
            pod: true,
        };
        let mut payloads = 0u32;
        for (_, ty) in &spec.cases {
            if let Some(ty) = ty {
                let payload = self.layout_of_name(ty);
                layout.size = layout.size.max(payload.size);
                layout.mask = layout.mask.max(payload.mask);
                layout.pod &= payload.pod;
                payloads += 1;
            }
        }
        // tag byte
        layout.size += 1;

        let descriptor = self.nominal_descriptor(ContextKind::Enum, 0, false, &spec.name, 28);
        let kind = if payloads > 1 { 3 } else { 2 };
        let fields = self.field_descriptor(&spec.name, kind, &spec.cases);
        self.link_fields(descriptor, fields);
        self.write_u32(descriptor + 20, payloads);
        self.write_u32(descriptor + 24, spec.cases.len() as u32 - payloads);

        let handle = self.typed_metadata(MetadataKind::Enum, layout, 2);
        self.write_word(handle.address() + word, descriptor);
        self.register(&spec.name, handle);
        handle
    }

    /// Number of metadata words before a root class's immediate members
    fn class_header_words(&self) -> u64 {
        // five words shared with the foreign object system, then the native fields up to
        // the descriptor and ivar destroyer
        5 + (24 / self.word()) + 2
    }

    pub fn class(&mut self, spec: ClassSpec) -> TypeHandle {
        let word = self.word();
        let inherited = spec.superclass.and_then(|superclass| self.classes.get(&superclass).copied());
        let imo = inherited.map_or(self.class_header_words(), |info| info.members_end);
        let start = inherited.map_or(2 * word, |info| info.instance_size);
        let (mut offsets, instance) = self.lay_out(start, &spec.fields);
        if let (Some(first), Some(slot)) = (spec.first_offset, offsets.first_mut()) {
            *slot = first;
        }

        // resilient classes keep a placeholder member so the vector offset stays nonzero
        let placeholder = u64::from(spec.resilient);
        let fovo_raw = spec.generic + placeholder;
        let fovo = imo + fovo_raw;
        let members = fovo_raw + offsets.len() as u64;
        let members_end = imo + members;

        let mut kind_flags = ClassDescriptorFlags::empty();
        if spec.resilient {
            kind_flags |= ClassDescriptorFlags::HAS_RESILIENT_SUPERCLASS;
        }
        let descriptor = self.nominal_descriptor(ContextKind::Class, kind_flags.bits(), spec.generic > 0, &spec.name, 44);
        let records: Vec<_> = spec
            .fields
            .iter()
            .map(|(name, ty)| (name.clone(), Some(ty.clone())))
            .collect();
        let fields = self.field_descriptor(&spec.name, 1, &records);
        self.link_fields(descriptor, fields);

        if let Some(info) = inherited {
            self.builder
                .write_relative_str(descriptor + 20, Some(info.name))
                .expect("superclass name");
        } else if spec.superclass.is_some() {
            self.write_name(descriptor + 20, Some("So8NSObjectC"));
        }

        if spec.resilient {
            let cache = self.alloc_words(1);
            self.write_word(cache, imo * word);
            self.builder
                .write_relative(descriptor + 24, Some(cache))
                .expect("bounds cache");
        } else {
            self.write_u32(descriptor + 24, 2);
            self.write_u32(descriptor + 28, members_end as u32);
        }
        self.write_u32(descriptor + 32, members as u32);
        self.write_u32(
            descriptor + 36,
            spec.declared_fields.unwrap_or(offsets.len() as u32),
        );
        let recorded = if spec.resilient { fovo_raw } else { fovo };
        self.write_u32(descriptor + 40, if offsets.is_empty() { 0 } else { recorded as u32 });

        let witness = self.class_witness;
        let handle = self.metadata(self.metaclass, Some(witness), members_end);
        let base = handle.address();
        self.write_word(base + word, spec.superclass.map_or(0, TypeHandle::address));
        self.write_word(base + 4 * word, 1);

        let native = base + 5 * word;
        let flags = if spec.foreign_refcounting {
            ClassFlags::empty()
        } else {
            ClassFlags::USES_SWIFT_REFCOUNTING
        };
        self.write_u32(native, flags.bits());
        self.write_u32(native + 8, instance.size as u32);
        self.builder
            .write_u16(native + 12, instance.mask.max(word - 1) as u16)
            .expect("align mask");
        self.write_u32(native + 16, (members_end + 1) as u32 * word as u32);
        self.write_u32(native + 20, word as u32);
        self.write_word(native + 24, descriptor);

        for (index, offset) in offsets.iter().enumerate() {
            self.write_word(base + (fovo + index as u64) * word, *offset);
        }

        let name = self.alloc_name(&spec.name);
        self.classes.insert(
            handle,
            ClassInfo {
                name,
                descriptor,
                members_end,
                instance_size: instance.size.max(start),
            },
        );
        self.layouts.insert(
            handle,
            Layout {
                size: word,
                mask: word - 1,
                pod: false,
            },
        );
        self.register(&spec.name, handle);
        handle
    }

    /// Points the superclass of `class` at `superclass`, in the metadata and the descriptor
    pub fn set_superclass(&mut self, class: TypeHandle, superclass: TypeHandle) {
        let word = self.word();
        self.write_word(class.address() + word, superclass.address());

        let descriptor = self.classes[&class].descriptor;
        let name = match self.classes.get(&superclass) {
            Some(info) => info.name,
            None => self.alloc_name("So8NSObjectC"),
        };
        self.builder
            .write_relative_str(descriptor + 20, Some(name))
            .expect("superclass name");
    }

    /// A class known only to the foreign object system
    pub fn foreign_class(&mut self, superclass: Option<TypeHandle>) -> TypeHandle {
        let word = self.word();
        let witness = self.class_witness;
        let handle = self.metadata(self.metaclass, Some(witness), 5);
        self.write_word(handle.address() + word, superclass.map_or(0, TypeHandle::address));
        self.layouts.insert(
            handle,
            Layout {
                size: word,
                mask: word - 1,
                pod: false,
            },
        );
        handle
    }

    /// A zeroed instance of `class`, `size` bytes long
    pub fn instance(&mut self, class: TypeHandle, size: u64) -> u64 {
        let word = self.word();
        let object = self.builder.alloc(size.max(2 * word) as usize, 16);
        self.write_word(object, class.address());
        self.write_word(object + word, 2);
        object
    }

    pub fn existential(&mut self, flags: u32) -> TypeHandle {
        let word = self.word();
        let tables = u64::from(flags & crate::metadata::existential::EXISTENTIAL_NUM_WITNESS_TABLES_MASK);
        let class_bound = flags & crate::metadata::existential::EXISTENTIAL_NON_CLASS_CONSTRAINT == 0;
        let words = if class_bound { 1 + tables } else { 4 + tables };
        let layout = Layout {
            size: words * word,
            mask: word - 1,
            pod: false,
        };

        let handle = self.typed_metadata(MetadataKind::Existential, layout, 2);
        let base = handle.address();
        self.write_u32(base + word, flags);
        self.write_u32(base + word + 4, 1);
        handle
    }

    /// A class-constrained container holding `object`
    pub fn class_container(&mut self, object: u64) -> u64 {
        let container = self.alloc_words(2);
        self.write_word(container, object);
        container
    }

    /// An opaque container of dynamic type `ty`, with its first buffer word pointing at
    /// `boxed` for out-of-line values
    pub fn opaque_container(&mut self, ty: TypeHandle, boxed: Option<u64>) -> u64 {
        let word = self.word();
        let container = self.alloc_words(5);
        if let Some(boxed) = boxed {
            self.write_word(container, boxed);
        }
        self.write_word(container + 3 * word, ty.address());
        container
    }

    /// Function metadata; parameter flags are emitted when any is nonzero
    pub fn function(&mut self, flags: u64, result: Option<TypeHandle>, parameters: &[(Option<TypeHandle>, u32)]) -> TypeHandle {
        let word = self.word();
        let count = parameters.len() as u64;
        let with_flags = parameters.iter().any(|(_, flags)| *flags != 0);
        let flag_words = if with_flags { (4 * count).div_ceil(word) } else { 0 };
        let layout = Layout {
            size: 2 * word,
            mask: word - 1,
            pod: false,
        };

        let handle = self.typed_metadata(MetadataKind::Function, layout, 3 + count + flag_words);
        let base = handle.address();
        let mut flags = flags | count;
        if with_flags {
            flags |= FUNCTION_HAS_PARAM_FLAGS;
        }
        self.write_word(base + word, flags);
        self.write_word(base + 2 * word, result.map_or(0, TypeHandle::address));
        for (index, (ty, _)) in parameters.iter().enumerate() {
            self.write_word(base + (3 + index as u64) * word, ty.map_or(0, TypeHandle::address));
        }
        if with_flags {
            let flag_base = base + (3 + count) * word;
            for (index, (_, flags)) in parameters.iter().enumerate() {
                self.write_u32(flag_base + 4 * index as u64, *flags);
            }
        }
        handle
    }

    /// Metadata of a closure capture box
    pub fn locals(&mut self, spec: CaptureSpec) -> TypeHandle {
        let word = self.word();
        let size = CAPTURE_DESCRIPTOR_HEADER_SIZE
            + CAPTURE_TYPE_SIZE * spec.captures.len() as u64
            + METADATA_SOURCE_SIZE * u64::from(spec.metadata_sources);
        let descriptor = self.builder.alloc(size as usize, 4);
        self.write_u32(descriptor, spec.captures.len() as u32);
        self.write_u32(descriptor + 4, spec.metadata_sources);
        self.write_u32(descriptor + 8, spec.bindings);
        for (index, ty) in spec.captures.iter().enumerate() {
            let entry = descriptor + CAPTURE_DESCRIPTOR_HEADER_SIZE + CAPTURE_TYPE_SIZE * index as u64;
            self.write_name(entry, Some(ty));
        }
        let sources = descriptor + CAPTURE_DESCRIPTOR_HEADER_SIZE + CAPTURE_TYPE_SIZE * spec.captures.len() as u64;
        for index in 0..u64::from(spec.metadata_sources) {
            let entry = sources + METADATA_SOURCE_SIZE * index;
            self.write_name(entry, Some("x"));
            self.write_name(entry + 4, Some("B0"));
        }

        let handle = self.metadata(MetadataKind::HeapLocalVariable.raw(), None, 3);
        self.write_u32(handle.address() + word, spec.first_capture);
        self.write_word(handle.address() + 2 * word, descriptor);
        handle
    }

    /// Metadata of a generic box holding a `boxed` value at `offset` (before alignment)
    pub fn generic_box(&mut self, boxed: Option<TypeHandle>, offset: u32) -> TypeHandle {
        let word = self.word();
        let handle = self.metadata(MetadataKind::HeapGenericLocalVariable.raw(), None, 3);
        self.write_u32(handle.address() + word, offset);
        self.write_word(handle.address() + 2 * word, boxed.map_or(0, TypeHandle::address));
        handle
    }
}
