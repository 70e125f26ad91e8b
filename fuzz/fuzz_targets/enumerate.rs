#![no_main]

use libfuzzer_sys::fuzz_target;
use metascope::{
    metadata::{kind::HeapKindMask, TypeHandle},
    runtime::RuntimeTables,
    visitor::MetadataVisitor,
    walkers::{collect_fields, values_equal, ApplyOptions},
    Image, Introspector, IntrospectorConfig, PointerWidth,
};

const BASE: u64 = 0x10_0000;

struct Lenient;

impl MetadataVisitor for Lenient {
    fn unknown_result(&self) -> bool {
        true
    }
}

fuzz_target!(|data: &[u8]| {
    let width = if data.first().is_some_and(|b| b & 1 == 1) {
        PointerWidth::Bits32
    } else {
        PointerWidth::Bits64
    };
    let Ok(image) = Image::from_mem(BASE, data.to_vec(), width) else {
        return;
    };

    let runtime = RuntimeTables::new();
    for (index, name) in ["Si", "Sb", "Bo", "Bp"].into_iter().enumerate() {
        runtime.register_type(name, TypeHandle::new(BASE + 8 * (index as u64 + 1)));
    }
    let cx = Introspector::with_config(&image, &runtime, IntrospectorConfig::minimal());

    let word = width.bytes_u64();
    for handle in (BASE + word..image.end()).step_by(word as usize).take(32) {
        let ty = TypeHandle::new(handle);
        for options in [ApplyOptions::empty(), ApplyOptions::REQUIRE_CLASS | ApplyOptions::IGNORE_UNKNOWN] {
            let _ = collect_fields(&cx, ty, options);
        }
        let _ = cx.visit(ty, &mut Lenient);
        let _ = cx.visit_heap(ty, &mut Lenient, HeapKindMask::ALL);
        let _ = values_equal(&cx, ty, BASE, BASE + word, ApplyOptions::REQUIRE_CLASS);
    }
});
