//! Descriptor merge: define a property from a partial descriptor, filling
//! absent attributes from a source object's own descriptor for the same key.
//!
//! Redefinition is gated on the target's current descriptor.  A key the
//! target does not have yet is treated as `{configurable: true, writable: true}`.
//! Accessors may be redefined when configurable; data properties only when
//! configurable and writable.  Every rejection is reported as `false`.

use crate::object_model::{
    JsValue, ObjectHandle, ObjectHeap, PartialDescriptor, PropertyDescriptor, PropertyKey,
};

/// May `key` on `target` be (re)defined?  Proxies and missing objects refuse.
pub fn can_redefine(heap: &ObjectHeap, target: ObjectHandle, key: &PropertyKey) -> bool {
    match heap.get_own_property_descriptor(target, key) {
        Ok(None) => true,
        Ok(Some(PropertyDescriptor::Accessor { configurable, .. })) => configurable,
        Ok(Some(PropertyDescriptor::Data {
            configurable,
            writable,
            ..
        })) => configurable && writable,
        Err(_) => false,
    }
}

/// Merge `partial` over `copy_from`'s own descriptor for `key` and define the
/// result on `target`.
///
/// An `Undefined` value counts as absent.  Attributes absent from both stay
/// unset and take the heap's defaults.  A merged getter or setter makes an
/// accessor (value and writable dropped); otherwise a data property results
/// (get and set dropped).  Returns whether the property was defined.
pub fn define_prop(
    heap: &mut ObjectHeap,
    target: ObjectHandle,
    key: PropertyKey,
    mut partial: PartialDescriptor,
    copy_from: Option<ObjectHandle>,
) -> bool {
    if !can_redefine(heap, target, &key) {
        return false;
    }
    if partial.value == Some(JsValue::Undefined) {
        partial.value = None;
    }

    if let Some(source) = copy_from
        && let Ok(Some(desc)) = heap.get_own_property_descriptor(source, &key)
    {
        let fallback = PartialDescriptor::from(&desc);
        partial.get = partial.get.or(fallback.get);
        partial.set = partial.set.or(fallback.set);
        partial.value = partial.value.or(fallback.value);
        partial.writable = partial.writable.or(fallback.writable);
        partial.enumerable = partial.enumerable.or(fallback.enumerable);
        partial.configurable = partial.configurable.or(fallback.configurable);
    }

    let merged = if partial.has_accessor() {
        PartialDescriptor {
            value: None,
            writable: None,
            ..partial
        }
    } else {
        PartialDescriptor {
            get: None,
            set: None,
            ..partial
        }
    };

    matches!(heap.define_property_partial(target, key, merged), Ok(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_key(s: &str) -> PropertyKey {
        PropertyKey::String(s.to_string())
    }

    fn int_val(n: i64) -> JsValue {
        JsValue::Int(n)
    }

    fn own(heap: &ObjectHeap, handle: ObjectHandle, key: &str) -> Option<PropertyDescriptor> {
        heap.get_own_property_descriptor(handle, &str_key(key)).unwrap()
    }

    fn hidden_readonly(value: JsValue) -> PropertyDescriptor {
        PropertyDescriptor::Data {
            value,
            writable: false,
            enumerable: false,
            configurable: true,
        }
    }

    #[test]
    fn missing_key_may_be_defined() {
        let mut heap = ObjectHeap::new();
        let obj = heap.alloc_object();
        assert!(can_redefine(&heap, obj, &str_key("fresh")));
    }

    #[test]
    fn data_property_needs_configurable_and_writable() {
        let mut heap = ObjectHeap::new();
        let obj = heap.alloc_object();
        heap.define_property(obj, str_key("ro"), hidden_readonly(int_val(1)))
            .unwrap();
        heap.set_property(obj, str_key("rw"), int_val(2)).unwrap();
        assert!(!can_redefine(&heap, obj, &str_key("ro")));
        assert!(can_redefine(&heap, obj, &str_key("rw")));
    }

    #[test]
    fn accessor_needs_only_configurable() {
        let mut heap = ObjectHeap::new();
        let obj = heap.alloc_object();
        let getter = heap.alloc_function("function () { return 1; }");
        heap.define_property(
            obj,
            str_key("acc"),
            PropertyDescriptor::Accessor {
                get: Some(getter),
                set: None,
                enumerable: true,
                configurable: true,
            },
        )
        .unwrap();
        assert!(can_redefine(&heap, obj, &str_key("acc")));
    }

    #[test]
    fn proxy_target_refuses() {
        let mut heap = ObjectHeap::new();
        let target = heap.alloc_object();
        let handler = heap.alloc_object();
        let proxy = heap.alloc_proxy(target, handler);
        assert!(!can_redefine(&heap, proxy, &str_key("x")));
        assert!(!define_prop(
            &mut heap,
            proxy,
            str_key("x"),
            PartialDescriptor::value(int_val(1)),
            None
        ));
    }

    #[test]
    fn attributes_come_from_source_descriptor() {
        let mut heap = ObjectHeap::new();
        let source = heap.alloc_object();
        heap.define_property(source, str_key("k"), hidden_readonly(int_val(1)))
            .unwrap();
        let target = heap.alloc_object();

        assert!(define_prop(
            &mut heap,
            target,
            str_key("k"),
            PartialDescriptor::value(int_val(9)),
            Some(source),
        ));
        assert_eq!(
            heap.get_own_property_descriptor(target, &str_key("k"))
                .unwrap(),
            Some(hidden_readonly(int_val(9)))
        );
    }

    #[test]
    fn without_source_attributes_stay_unset() {
        let mut heap = ObjectHeap::new();
        let target = heap.alloc_object();
        assert!(define_prop(
            &mut heap,
            target,
            str_key("k"),
            PartialDescriptor::value(int_val(3)),
            None,
        ));
        assert_eq!(
            heap.get_own_property_descriptor(target, &str_key("k"))
                .unwrap(),
            Some(PropertyDescriptor::data_frozen(int_val(3)))
        );
    }

    #[test]
    fn undefined_value_is_filled_from_source() {
        let mut heap = ObjectHeap::new();
        let source = heap.alloc_object();
        heap.set_property(source, str_key("k"), int_val(4)).unwrap();
        let target = heap.alloc_object();
        assert!(define_prop(
            &mut heap,
            target,
            str_key("k"),
            PartialDescriptor::value(JsValue::Undefined),
            Some(source),
        ));
        assert_eq!(
            own(&heap, target, "k"),
            Some(PropertyDescriptor::data(int_val(4)))
        );
    }

    #[test]
    fn accessor_source_wins_over_value() {
        let mut heap = ObjectHeap::new();
        let getter = heap.alloc_function("function () { return 1; }");
        let setter = heap.alloc_function("function (v) {}");
        let source = heap.alloc_object();
        heap.define_property(
            source,
            str_key("acc"),
            PropertyDescriptor::Accessor {
                get: Some(getter),
                set: Some(setter),
                enumerable: false,
                configurable: true,
            },
        )
        .unwrap();
        let target = heap.alloc_object();

        assert!(define_prop(
            &mut heap,
            target,
            str_key("acc"),
            PartialDescriptor::value(int_val(1)),
            Some(source),
        ));
        assert_eq!(
            own(&heap, target, "acc"),
            Some(PropertyDescriptor::Accessor {
                get: Some(getter),
                set: Some(setter),
                enumerable: false,
                configurable: true,
            })
        );
    }

    #[test]
    fn locked_target_property_is_skipped_silently() {
        let mut heap = ObjectHeap::new();
        let target = heap.alloc_object();
        heap.define_property(target, str_key("k"), PropertyDescriptor::data_frozen(int_val(1)))
            .unwrap();
        assert!(!define_prop(
            &mut heap,
            target,
            str_key("k"),
            PartialDescriptor::value(int_val(2)),
            None,
        ));
        assert_eq!(heap.get_property(target, &str_key("k")).unwrap(), int_val(1));
    }

    #[test]
    fn non_extensible_target_reports_false() {
        let mut heap = ObjectHeap::new();
        let target = heap.alloc_object();
        heap.prevent_extensions(target).unwrap();
        assert!(!define_prop(
            &mut heap,
            target,
            str_key("k"),
            PartialDescriptor::value(int_val(2)),
            None,
        ));
    }
}
