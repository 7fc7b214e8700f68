//! Edge-case tests for structural cloning.
//!
//! Focus areas:
//! - Deep graphs without recursion limits
//! - Key order, symbol keys and non-enumerable keys
//! - Null prototypes, frozen sources and subclassed arrays
//! - Opaque values: bad constructors, proxy prototypes, dangling handles
//! - Date own properties and invalid dates
//! - Callable flavors and the share policy
//! - Host nodes under the detached host
//! - Event log shape

use frankenengine_clone::callable_source::synthesize_function;
use frankenengine_clone::classify::{OpaqueReason, ValueCategory, classify};
use frankenengine_clone::host::DetachedHost;
use frankenengine_clone::object_model::{
    HostNodeData, JsValue, ObjectHandle, ObjectHeap, ObjectKind, PropertyDescriptor, PropertyKey,
    TimeValue,
};
use frankenengine_clone::structural_clone::{
    CallablePolicy, CloneConfig, CloneReport, StructuralCloner, structural_clone,
};
use frankenengine_clone::structural_digest::structural_digest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn str_key(s: &str) -> PropertyKey {
    PropertyKey::String(s.to_string())
}

fn int_val(n: i64) -> JsValue {
    JsValue::Int(n)
}

fn clone_handle(heap: &mut ObjectHeap, handle: ObjectHandle) -> ObjectHandle {
    structural_clone(heap, &JsValue::Object(handle))
        .unwrap()
        .as_object()
        .expect("object clone")
}

fn clone_with(heap: &mut ObjectHeap, config: CloneConfig, handle: ObjectHandle) -> CloneReport {
    StructuralCloner::new(config)
        .clone_value(heap, &mut DetachedHost::new(), &JsValue::Object(handle))
        .unwrap()
}

fn prop(heap: &ObjectHeap, handle: ObjectHandle, key: &str) -> JsValue {
    heap.get_property(handle, &str_key(key)).unwrap()
}

fn function_source(heap: &ObjectHeap, handle: ObjectHandle) -> String {
    match heap.kind(handle).unwrap() {
        ObjectKind::Function(data) => data.source.clone(),
        other => panic!("expected function, got {}", other.name()),
    }
}

// ---------------------------------------------------------------------------
// Deep graphs
// ---------------------------------------------------------------------------

#[test]
fn long_linked_list_clones_without_recursion() {
    const DEPTH: i64 = 50_000;
    let mut heap = ObjectHeap::new();
    let mut head = JsValue::Null;
    for n in 0..DEPTH {
        let node = heap.alloc_object();
        heap.set_property(node, str_key("n"), int_val(n)).unwrap();
        heap.set_property(node, str_key("next"), head).unwrap();
        head = JsValue::Object(node);
    }
    let original = head.as_object().unwrap();

    let copy = clone_handle(&mut heap, original);

    let mut cursor = JsValue::Object(copy);
    let mut seen = 0;
    while let JsValue::Object(node) = cursor {
        assert_eq!(prop(&heap, node, "n"), int_val(DEPTH - 1 - seen));
        cursor = prop(&heap, node, "next");
        seen += 1;
    }
    assert_eq!(seen, DEPTH);
    assert_eq!(
        structural_digest(&heap, &JsValue::Object(original)),
        structural_digest(&heap, &JsValue::Object(copy))
    );
}

#[test]
fn deeply_nested_arrays_clone() {
    let mut heap = ObjectHeap::new();
    let mut inner = heap.alloc_array(vec![int_val(0)]);
    for _ in 0..10_000 {
        inner = heap.alloc_array(vec![JsValue::Object(inner)]);
    }
    let report = clone_with(&mut heap, CloneConfig::verified(), inner);
    assert!(report.witness.unwrap().matches);
    assert_eq!(report.stats.containers, 10_001);
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[test]
fn own_key_order_is_preserved() {
    let mut heap = ObjectHeap::new();
    let symbol = heap.alloc_symbol();
    let original = heap.alloc_object();
    heap.set_property(original, str_key("b"), int_val(1)).unwrap();
    heap.define_property(
        original,
        PropertyKey::Symbol(symbol),
        PropertyDescriptor::data_hidden(int_val(2)),
    )
    .unwrap();
    heap.set_property(original, str_key("a"), int_val(3)).unwrap();
    heap.set_property(original, str_key("1"), int_val(4)).unwrap();

    let copy = clone_handle(&mut heap, original);

    let keys = heap.own_keys(copy).unwrap();
    assert_eq!(keys, heap.own_keys(original).unwrap());
    assert_eq!(
        keys,
        vec![
            str_key("1"),
            str_key("b"),
            str_key("a"),
            PropertyKey::Symbol(symbol)
        ]
    );
    assert_eq!(
        heap.get_own_property_descriptor(copy, &PropertyKey::Symbol(symbol))
            .unwrap(),
        Some(PropertyDescriptor::data_hidden(int_val(2)))
    );
}

#[test]
fn symbol_values_keep_identity() {
    let mut heap = ObjectHeap::new();
    let symbol = heap.alloc_symbol();
    let original = heap.alloc_object();
    heap.set_property(original, str_key("tag"), JsValue::Symbol(symbol))
        .unwrap();
    let copy = clone_handle(&mut heap, original);
    assert_eq!(prop(&heap, copy, "tag"), JsValue::Symbol(symbol));
}

// ---------------------------------------------------------------------------
// Prototypes and integrity levels
// ---------------------------------------------------------------------------

#[test]
fn null_prototype_object_is_cloned() {
    let mut heap = ObjectHeap::new();
    let dict = heap.alloc(None);
    heap.set_property(dict, str_key("x"), int_val(1)).unwrap();

    let copy = clone_handle(&mut heap, dict);
    assert_ne!(copy, dict);
    assert_eq!(heap.get_prototype_of(copy).unwrap(), None);
    assert_eq!(prop(&heap, copy, "x"), int_val(1));
}

#[test]
fn frozen_source_gives_locked_properties_on_extensible_clone() {
    let mut heap = ObjectHeap::new();
    let original = heap.alloc_object();
    heap.set_property(original, str_key("a"), int_val(1)).unwrap();
    heap.freeze(original).unwrap();

    let copy = clone_handle(&mut heap, original);

    let desc = heap
        .get_own_property_descriptor(copy, &str_key("a"))
        .unwrap()
        .unwrap();
    assert!(!desc.is_writable());
    assert!(!desc.is_configurable());
    assert!(desc.is_enumerable());
    assert!(heap.is_extensible(copy).unwrap());
    assert!(!heap.set_property(copy, str_key("a"), int_val(2)).unwrap());
}

#[test]
fn array_extras_and_holes_survive() {
    let mut heap = ObjectHeap::new();
    let arr = heap.alloc_array(vec![int_val(1), int_val(2)]);
    heap.set_property(arr, str_key("tag"), JsValue::from("x"))
        .unwrap();
    heap.set_property(arr, str_key("5"), int_val(6)).unwrap();

    let copy = clone_handle(&mut heap, arr);

    assert_eq!(prop(&heap, copy, "length"), int_val(6));
    assert_eq!(prop(&heap, copy, "tag"), JsValue::from("x"));
    assert_eq!(prop(&heap, copy, "5"), int_val(6));
    assert!(
        heap.get_own_property_descriptor(copy, &str_key("3"))
            .unwrap()
            .is_none()
    );
    assert_eq!(heap.own_keys(copy).unwrap(), heap.own_keys(arr).unwrap());
}

#[test]
fn subclassed_array_is_rebuilt_on_array_prototype() {
    let mut heap = ObjectHeap::new();
    let ctor = synthesize_function(&mut heap, "class List extends Array {}").unwrap();
    let JsValue::Object(list_proto) = prop(&heap, ctor, "prototype") else {
        panic!("class has a prototype object");
    };
    let array_proto = heap.intrinsics().array_prototype;
    heap.set_prototype_of(list_proto, Some(array_proto)).unwrap();
    let list = heap.alloc_array(vec![int_val(1)]);
    heap.set_prototype_of(list, Some(list_proto)).unwrap();

    assert!(matches!(
        classify(&heap, &JsValue::Object(list)),
        ValueCategory::Constructed(_)
    ));
    let copy = clone_handle(&mut heap, list);
    assert_eq!(heap.kind(copy).unwrap(), &ObjectKind::Array);
    assert_eq!(heap.get_prototype_of(copy).unwrap(), Some(array_proto));
    assert_eq!(prop(&heap, copy, "0"), int_val(1));
}

// ---------------------------------------------------------------------------
// Opaque values
// ---------------------------------------------------------------------------

#[test]
fn non_callable_constructor_passes_through() {
    let mut heap = ObjectHeap::new();
    let odd = heap.alloc_object();
    heap.set_property(odd, str_key("constructor"), int_val(42))
        .unwrap();

    let report = clone_with(&mut heap, CloneConfig::default(), odd);
    assert_eq!(report.value, JsValue::Object(odd));
    assert_eq!(report.stats.passthroughs, 1);
    assert!(
        report
            .events
            .iter()
            .any(|e| e.event == "opaque_passthrough" && e.error_code.is_some())
    );
}

#[test]
fn proxy_in_prototype_chain_passes_through() {
    let mut heap = ObjectHeap::new();
    let target = heap.alloc_object();
    let handler = heap.alloc_object();
    let proxy = heap.alloc_proxy(target, handler);
    let child = heap.alloc(Some(proxy));

    assert_eq!(
        classify(&heap, &JsValue::Object(child)),
        ValueCategory::Opaque(OpaqueReason::ProxyInPrototypeChain)
    );
    assert_eq!(clone_handle(&mut heap, child), child);
}

#[test]
fn accessor_constructor_passes_through() {
    let mut heap = ObjectHeap::new();
    let getter = synthesize_function(&mut heap, "function () { return 1; }").unwrap();
    let odd = heap.alloc_object();
    heap.define_property(
        odd,
        str_key("constructor"),
        PropertyDescriptor::Accessor {
            get: Some(getter),
            set: None,
            enumerable: false,
            configurable: true,
        },
    )
    .unwrap();
    assert_eq!(clone_handle(&mut heap, odd), odd);
}

#[test]
fn dangling_and_revoked_handles_pass_through() {
    let mut heap = ObjectHeap::new();
    let dangling = JsValue::Object(ObjectHandle(999_999));
    assert_eq!(structural_clone(&mut heap, &dangling).unwrap(), dangling);

    let target = heap.alloc_object();
    let handler = heap.alloc_object();
    let proxy = heap.alloc_proxy(target, handler);
    heap.revoke_proxy(proxy).unwrap();
    assert_eq!(clone_handle(&mut heap, proxy), proxy);
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

#[test]
fn date_own_properties_are_not_copied() {
    let mut heap = ObjectHeap::new();
    let date = heap.alloc_date(TimeValue::from_epoch_ms(0));
    heap.set_property(date, str_key("label"), JsValue::from("epoch"))
        .unwrap();

    let copy = clone_handle(&mut heap, date);
    assert!(heap.own_keys(copy).unwrap().is_empty());
    assert_eq!(
        heap.kind(copy).unwrap(),
        &ObjectKind::Date(TimeValue::from_epoch_ms(0))
    );
}

#[test]
fn invalid_date_stays_invalid() {
    let mut heap = ObjectHeap::new();
    let date = heap.alloc_date(TimeValue::invalid());
    let copy = clone_handle(&mut heap, date);
    assert_ne!(copy, date);
    assert_eq!(
        heap.kind(copy).unwrap(),
        &ObjectKind::Date(TimeValue::invalid())
    );
}

// ---------------------------------------------------------------------------
// Callables
// ---------------------------------------------------------------------------

#[test]
fn async_method_shorthand_becomes_async_function() {
    let mut heap = ObjectHeap::new();
    let method = heap.alloc_function("async load(url) { return url; }");
    let copy = clone_handle(&mut heap, method);
    assert_eq!(
        function_source(&heap, copy),
        "async function load(url) { return url; }"
    );
    assert!(
        heap.get_own_property_descriptor(copy, &str_key("prototype"))
            .unwrap()
            .is_none()
    );
}

#[test]
fn arrow_clone_has_no_prototype() {
    let mut heap = ObjectHeap::new();
    let arrow = heap.alloc_function("(a, b) => a + b");
    let copy = clone_handle(&mut heap, arrow);
    assert_eq!(function_source(&heap, copy), "(a, b) => a + b");
    assert_eq!(prop(&heap, copy, "length"), int_val(2));
    assert!(
        heap.get_own_property_descriptor(copy, &str_key("prototype"))
            .unwrap()
            .is_none()
    );
}

#[test]
fn same_function_reached_twice_is_synthesized_once() {
    let mut heap = ObjectHeap::new();
    let f = heap.alloc_function("function f() {}");
    let root = heap.alloc_object();
    heap.set_property(root, str_key("a"), JsValue::Object(f)).unwrap();
    heap.set_property(root, str_key("b"), JsValue::Object(f)).unwrap();

    let report = clone_with(&mut heap, CloneConfig::default(), root);
    let copy = report.value.as_object().unwrap();

    assert_eq!(report.stats.callables_synthesized, 1);
    assert_eq!(prop(&heap, copy, "a"), prop(&heap, copy, "b"));
    assert_ne!(prop(&heap, copy, "a"), JsValue::Object(f));
}

#[test]
fn share_policy_keeps_function_identity() {
    let mut heap = ObjectHeap::new();
    let native = heap.intrinsics().array_constructor;
    let f = heap.alloc_function("function f() {}");
    let root = heap.alloc_object();
    heap.set_property(root, str_key("f"), JsValue::Object(f)).unwrap();
    heap.set_property(root, str_key("native"), JsValue::Object(native))
        .unwrap();

    let config = CloneConfig::default().with_callable_policy(CallablePolicy::Share);
    let report = clone_with(&mut heap, config, root);
    let copy = report.value.as_object().unwrap();

    assert_ne!(copy, root);
    assert_eq!(prop(&heap, copy, "f"), JsValue::Object(f));
    assert_eq!(prop(&heap, copy, "native"), JsValue::Object(native));
    assert_eq!(report.stats.callables_shared, 2);
}

#[test]
fn native_function_fails_under_resynthesis() {
    let mut heap = ObjectHeap::new();
    let native = heap.intrinsics().object_constructor;
    assert!(structural_clone(&mut heap, &JsValue::Object(native)).is_err());
}

// ---------------------------------------------------------------------------
// Host nodes
// ---------------------------------------------------------------------------

#[test]
fn detached_host_duplicates_nested_nodes() {
    let mut heap = ObjectHeap::new();
    let child = heap.alloc_host_node(HostNodeData::new("li"), None);
    let mut list = HostNodeData::new("ul");
    list.children.push(child);
    let node = heap.alloc_host_node(list, None);
    let root = heap.alloc_object();
    heap.set_property(root, str_key("node"), JsValue::Object(node))
        .unwrap();

    let mut host = DetachedHost::new();
    let report = StructuralCloner::default()
        .clone_value(&mut heap, &mut host, &JsValue::Object(root))
        .unwrap();
    let copy = report.value.as_object().unwrap();
    let JsValue::Object(node_copy) = prop(&heap, copy, "node") else {
        panic!("node was cloned to an object");
    };

    assert_ne!(node_copy, node);
    match heap.kind(node_copy).unwrap() {
        ObjectKind::HostNode(data) => {
            assert_eq!(data.node_name, "ul");
            assert_eq!(data.children.len(), 1);
            assert_ne!(data.children[0], child);
        }
        other => panic!("expected host node, got {}", other.name()),
    }
    assert_eq!(host.nodes_duplicated, 2);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn event_log_serializes_as_jsonl() {
    let mut heap = ObjectHeap::new();
    let root = heap.alloc_object();
    let report = clone_with(
        &mut heap,
        CloneConfig::verified().with_trace_id("edge-jsonl"),
        root,
    );

    let jsonl = report.events_jsonl().unwrap();
    let lines: Vec<&str> = jsonl.lines().collect();
    assert_eq!(lines.len(), report.events.len());
    for line in lines {
        let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(parsed["trace_id"], "edge-jsonl");
        assert_eq!(parsed["component"], "structural_clone");
    }
    assert_eq!(
        report.events.last().map(|e| e.event.as_str()),
        Some("clone_complete")
    );
}
