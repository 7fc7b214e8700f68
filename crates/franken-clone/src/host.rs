//! Host capabilities the cloner delegates to.
//!
//! Tree-node duplication and callable synthesis belong to the embedding
//! environment.  [`CloneHost`] is the seam; [`DetachedHost`] is the default
//! used when no document or evaluator is attached.

use std::collections::BTreeMap;

use crate::callable_source::{SynthesisError, synthesize_function};
use crate::object_model::{
    FunctionData, HostNodeData, JsValue, ManagedObject, ObjectError, ObjectHandle, ObjectHeap,
    ObjectKind, PropertyKey,
};

/// Capabilities supplied by the embedding environment.
pub trait CloneHost {
    /// Duplicate `node` and its subtree, returning the new node.  The cloner
    /// returns this result without inspecting it.
    fn deep_duplicate_node(
        &mut self,
        heap: &mut ObjectHeap,
        node: ObjectHandle,
    ) -> Result<ObjectHandle, ObjectError>;

    /// Build a callable from `source`.  `context` is the callable being
    /// cloned, so self-references can resolve against it.
    fn synthesize_callable(
        &mut self,
        heap: &mut ObjectHeap,
        source: &str,
        context: ObjectHandle,
    ) -> Result<ObjectHandle, SynthesisError>;
}

/// Host with no document and no evaluator.
///
/// Nodes are duplicated from their [`HostNodeData`]: name, attributes and the
/// child subtree, keeping the original's prototype.  Expando properties are
/// not copied.  Callables are synthesized with
/// [`synthesize_function`](crate::callable_source::synthesize_function).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetachedHost {
    pub nodes_duplicated: u64,
    pub callables_synthesized: u64,
}

impl DetachedHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn shallow_node(
        &mut self,
        heap: &mut ObjectHeap,
        node: ObjectHandle,
    ) -> Result<ObjectHandle, ObjectError> {
        let original = heap.ordinary(node, "cloneNode")?;
        let ObjectKind::HostNode(data) = &original.kind else {
            return Err(ObjectError::TypeError(format!("{node} is not a host node")));
        };
        let copy = HostNodeData {
            node_name: data.node_name.clone(),
            attributes: data.attributes.clone(),
            children: Vec::new(),
        };
        let prototype = original.prototype;
        self.nodes_duplicated += 1;
        Ok(heap.alloc_host_node(copy, prototype))
    }
}

impl CloneHost for DetachedHost {
    fn deep_duplicate_node(
        &mut self,
        heap: &mut ObjectHeap,
        node: ObjectHandle,
    ) -> Result<ObjectHandle, ObjectError> {
        let root = self.shallow_node(heap, node)?;
        let mut copies = BTreeMap::from([(node, root)]);
        let mut work_stack = vec![(node, root)];

        while let Some((original, copy)) = work_stack.pop() {
            let children = match heap.kind(original)? {
                ObjectKind::HostNode(data) => data.children.clone(),
                _ => continue,
            };
            let mut new_children = Vec::with_capacity(children.len());
            for child in children {
                if let Some(existing) = copies.get(&child) {
                    new_children.push(*existing);
                    continue;
                }
                if matches!(heap.kind(child), Ok(ObjectKind::HostNode(_))) {
                    let child_copy = self.shallow_node(heap, child)?;
                    copies.insert(child, child_copy);
                    work_stack.push((child, child_copy));
                    new_children.push(child_copy);
                } else {
                    // Non-node children are shared.
                    new_children.push(child);
                }
            }
            if let ManagedObject::Ordinary(o) = heap.get_mut(copy)?
                && let ObjectKind::HostNode(data) = &mut o.kind
            {
                data.children = new_children;
            }
        }
        Ok(root)
    }

    fn synthesize_callable(
        &mut self,
        heap: &mut ObjectHeap,
        source: &str,
        context: ObjectHandle,
    ) -> Result<ObjectHandle, SynthesisError> {
        if let Ok(ObjectKind::Function(FunctionData { native: true, .. })) = heap.kind(context) {
            let name = match heap.get_property(context, &PropertyKey::from("name")) {
                Ok(JsValue::Str(name)) if !name.is_empty() => name,
                _ => "anonymous".to_string(),
            };
            return Err(SynthesisError::NativeCode(name));
        }
        let function = synthesize_function(heap, source)?;
        self.callables_synthesized += 1;
        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_key(s: &str) -> PropertyKey {
        PropertyKey::String(s.to_string())
    }

    fn node_data(heap: &ObjectHeap, handle: ObjectHandle) -> HostNodeData {
        match heap.kind(handle).unwrap() {
            ObjectKind::HostNode(data) => data.clone(),
            other => panic!("expected host node, got {}", other.name()),
        }
    }

    #[test]
    fn duplicates_subtree_with_attributes_and_prototype() {
        let mut heap = ObjectHeap::new();
        let node_proto = heap.alloc_object();
        let leaf = heap.alloc_host_node(HostNodeData::new("span"), Some(node_proto));
        let mut root_data = HostNodeData::new("div");
        root_data.attributes.push(("id".into(), "main".into()));
        root_data.children.push(leaf);
        let root = heap.alloc_host_node(root_data, Some(node_proto));

        let mut host = DetachedHost::new();
        let copy = host.deep_duplicate_node(&mut heap, root).unwrap();

        assert_ne!(copy, root);
        let copied = node_data(&heap, copy);
        assert_eq!(copied.node_name, "div");
        assert_eq!(copied.attributes, vec![("id".to_string(), "main".to_string())]);
        assert_eq!(copied.children.len(), 1);
        assert_ne!(copied.children[0], leaf);
        assert_eq!(node_data(&heap, copied.children[0]).node_name, "span");
        assert_eq!(heap.get_prototype_of(copy).unwrap(), Some(node_proto));
        assert_eq!(host.nodes_duplicated, 2);
    }

    #[test]
    fn expando_properties_are_not_copied() {
        let mut heap = ObjectHeap::new();
        let node = heap.alloc_host_node(HostNodeData::new("p"), None);
        heap.set_property(node, str_key("expando"), JsValue::Int(1))
            .unwrap();
        let copy = DetachedHost::new()
            .deep_duplicate_node(&mut heap, node)
            .unwrap();
        assert!(heap.own_keys(copy).unwrap().is_empty());
    }

    #[test]
    fn duplicating_a_non_node_is_a_type_error() {
        let mut heap = ObjectHeap::new();
        let obj = heap.alloc_object();
        assert!(matches!(
            DetachedHost::new().deep_duplicate_node(&mut heap, obj),
            Err(ObjectError::TypeError(_))
        ));
    }

    #[test]
    fn synthesizes_from_source() {
        let mut heap = ObjectHeap::new();
        let original = heap.alloc_function("function twice(x) { return x * 2; }");
        let mut host = DetachedHost::new();
        let copy = host
            .synthesize_callable(&mut heap, "function twice(x) { return x * 2; }", original)
            .unwrap();
        assert_ne!(copy, original);
        assert_eq!(
            heap.get_property(copy, &str_key("length")).unwrap(),
            JsValue::Int(1)
        );
        assert_eq!(host.callables_synthesized, 1);
    }

    #[test]
    fn native_context_is_rejected_by_flag() {
        let mut heap = ObjectHeap::new();
        let ctor = heap.intrinsics().array_constructor;
        let err = DetachedHost::new()
            .synthesize_callable(&mut heap, "function Array() { [native code] }", ctor)
            .unwrap_err();
        assert_eq!(err, SynthesisError::NativeCode("Array".into()));
    }
}
