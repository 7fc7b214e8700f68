//! Value classification for the clone dispatcher.
//!
//! Classification reads internal slots and data properties only.  It never
//! runs a getter or a proxy trap, so classifying a value has no side effects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_model::{
    JsValue, ManagedObject, ObjectError, ObjectHandle, ObjectHeap, ObjectKind, PropertyDescriptor,
    PropertyKey,
};

/// Whether a structural copy starts from an empty array or a prototype-linked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContainerShape {
    Sequence,
    Mapping,
}

/// Why a value is passed through by reference instead of copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OpaqueReason {
    /// The value is a Proxy; introspecting it would run traps.
    Proxy,
    /// The handle does not name an object on the heap.
    Dangling,
    /// `constructor` resolves to an accessor; reading it would run code.
    AccessorConstructor,
    /// A Proxy sits on the prototype chain between the value and `constructor`.
    ProxyInPrototypeChain,
    /// The prototype chain is cyclic, too deep, or names a missing object.
    PrototypeChainBroken,
    /// `constructor` resolves to something that is neither callable nor undefined.
    NonCallableConstructor,
}

impl fmt::Display for OpaqueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Proxy => "proxy",
            Self::Dangling => "dangling",
            Self::AccessorConstructor => "accessor_constructor",
            Self::ProxyInPrototypeChain => "proxy_in_prototype_chain",
            Self::PrototypeChainBroken => "prototype_chain_broken",
            Self::NonCallableConstructor => "non_callable_constructor",
        };
        f.write_str(s)
    }
}

/// Closed set of categories the dispatcher routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueCategory {
    /// Not an object; returned as-is.
    Primitive,
    /// Host tree node; duplicated by the host.
    HostNode,
    /// Array or plain object built by the realm's `Array`/`Object`.
    Container(ContainerShape),
    /// Date instant.
    Temporal,
    /// Function object.
    Callable,
    /// Object with a class-like constructor, or no constructor at all.
    Constructed(ContainerShape),
    /// Passed through by reference.
    Opaque(OpaqueReason),
}

impl ValueCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::HostNode => "host_node",
            Self::Container(ContainerShape::Sequence) => "container_sequence",
            Self::Container(ContainerShape::Mapping) => "container_mapping",
            Self::Temporal => "temporal",
            Self::Callable => "callable",
            Self::Constructed(ContainerShape::Sequence) => "constructed_sequence",
            Self::Constructed(ContainerShape::Mapping) => "constructed_mapping",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Routed to the structural copier?
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Container(_) | Self::Constructed(_))
    }

    /// Returned by reference, unchanged?
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Primitive | Self::Opaque(_))
    }
}

impl fmt::Display for ValueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque(reason) => write!(f, "opaque({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Classify `value`.
pub fn classify(heap: &ObjectHeap, value: &JsValue) -> ValueCategory {
    match value {
        JsValue::Object(handle) => classify_object(heap, *handle),
        _ => ValueCategory::Primitive,
    }
}

fn classify_object(heap: &ObjectHeap, handle: ObjectHandle) -> ValueCategory {
    let obj = match heap.get(handle) {
        Ok(ManagedObject::Ordinary(o)) => o,
        Ok(ManagedObject::Proxy(_)) => return ValueCategory::Opaque(OpaqueReason::Proxy),
        Err(_) => return ValueCategory::Opaque(OpaqueReason::Dangling),
    };

    let shape = match obj.kind {
        ObjectKind::HostNode(_) => return ValueCategory::HostNode,
        ObjectKind::Date(_) => return ValueCategory::Temporal,
        ObjectKind::Function(_) => return ValueCategory::Callable,
        ObjectKind::Array => ContainerShape::Sequence,
        ObjectKind::Ordinary => ContainerShape::Mapping,
    };

    let key = PropertyKey::from("constructor");
    let constructor = match heap.find_property(handle, &key) {
        Ok(None) => return ValueCategory::Constructed(shape),
        Ok(Some((_, PropertyDescriptor::Accessor { .. }))) => {
            return ValueCategory::Opaque(OpaqueReason::AccessorConstructor);
        }
        Ok(Some((_, PropertyDescriptor::Data { value, .. }))) => value,
        Err(ObjectError::TypeError(_)) => {
            return ValueCategory::Opaque(OpaqueReason::ProxyInPrototypeChain);
        }
        Err(_) => return ValueCategory::Opaque(OpaqueReason::PrototypeChainBroken),
    };

    match constructor {
        JsValue::Undefined => ValueCategory::Constructed(shape),
        JsValue::Object(ctor) => {
            let intrinsics = heap.intrinsics();
            if *ctor == intrinsics.object_constructor || *ctor == intrinsics.array_constructor {
                ValueCategory::Container(shape)
            } else if heap.is_callable(*ctor) {
                ValueCategory::Constructed(shape)
            } else {
                ValueCategory::Opaque(OpaqueReason::NonCallableConstructor)
            }
        }
        _ => ValueCategory::Opaque(OpaqueReason::NonCallableConstructor),
    }
}
