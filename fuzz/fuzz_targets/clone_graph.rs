#![no_main]

use frankenengine_clone::host::DetachedHost;
use frankenengine_clone::object_model::{
    HostNodeData, JsValue, ObjectHandle, ObjectHeap, PropertyDescriptor, PropertyKey, TimeValue,
};
use frankenengine_clone::structural_clone::{CallablePolicy, CloneConfig, StructuralCloner};
use frankenengine_clone::structural_digest::structural_digest;
use libfuzzer_sys::fuzz_target;

const MAX_OPS: usize = 256;

const SOURCES: &[&str] = &[
    "function f(a, b) { return a + b; }",
    "(x) => x * 2",
    "async load(url) { return url; }",
    "class Point { constructor(x, y) { this.x = x; } }",
    "function* gen() { yield 1; }",
    "function broken( {",
    "function Native() { [native code] }",
    "x => { return `${x}`; }",
];

const KEYS: &[&str] = &["a", "b", "0", "1", "length", "constructor", "self"];

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut heap = ObjectHeap::new();
    let symbol = heap.alloc_symbol();
    let mut objects: Vec<ObjectHandle> = vec![heap.alloc_object()];

    for chunk in data.chunks(3).take(MAX_OPS) {
        let op = chunk[0];
        let a = usize::from(byte(chunk, 1));
        let b = byte(chunk, 2);
        let target = objects[a % objects.len()];
        match op % 10 {
            0 => objects.push(heap.alloc_object()),
            1 => objects.push(heap.alloc_array(vec![JsValue::Int(i64::from(b))])),
            2 => objects.push(heap.alloc_date(TimeValue::from_epoch_ms(i64::from(b) * 1000))),
            3 => objects.push(heap.alloc_function(SOURCES[usize::from(b) % SOURCES.len()])),
            4 => objects.push(heap.alloc_host_node(HostNodeData::new("div"), None)),
            5 => {
                let handler = heap.alloc_object();
                objects.push(heap.alloc_proxy(target, handler));
            }
            6 => {
                let value = JsValue::Object(objects[usize::from(b) % objects.len()]);
                let _ = heap.set_property(target, key(b), value);
            }
            7 => {
                let desc = match b % 3 {
                    0 => PropertyDescriptor::data_frozen(JsValue::Int(i64::from(b))),
                    1 => PropertyDescriptor::data_hidden(JsValue::Symbol(symbol)),
                    _ => PropertyDescriptor::Accessor {
                        get: Some(objects[usize::from(b) % objects.len()]),
                        set: None,
                        enumerable: true,
                        configurable: b % 2 == 0,
                    },
                };
                let _ = heap.define_property(target, key(b), desc);
            }
            8 => {
                let proto = objects[usize::from(b) % objects.len()];
                let _ = heap.set_prototype_of(target, Some(proto));
            }
            _ => {
                let _ = heap.freeze(target);
            }
        }
    }

    let root = JsValue::Object(objects[usize::from(data[0]) % objects.len()]);
    let before = structural_digest(&heap, &root);
    let policy = if data.len() % 2 == 0 {
        CallablePolicy::Resynthesize
    } else {
        CallablePolicy::Share
    };
    let cloner = StructuralCloner::new(CloneConfig::verified().with_callable_policy(policy));

    if let Ok(report) = cloner.clone_value(&mut heap, &mut DetachedHost::new(), &root) {
        assert!(report.events_jsonl().is_ok());
    }
    assert_eq!(before, structural_digest(&heap, &root));
});

fn key(b: u8) -> PropertyKey {
    PropertyKey::from(KEYS[usize::from(b) % KEYS.len()])
}

fn byte(data: &[u8], index: usize) -> u8 {
    data.get(index).copied().unwrap_or(0)
}
