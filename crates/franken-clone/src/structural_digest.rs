//! Identity-independent digest of a value graph.
//!
//! Objects are numbered in first-visit order, so two graphs with the same
//! shape hash equal even though their handles differ.  The digest covers
//! own-key order, full descriptors, sharing and cycles.  Prototypes, accessor
//! functions and proxies are hashed by handle: a faithful clone shares them
//! with its source.  Functions hash as their declaration source, dates as their
//! time value, and host nodes as name, attributes and children.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::callable_source::declaration_source;
use crate::object_model::{
    JsValue, ManagedObject, ObjectHandle, ObjectHeap, ObjectKind, PropertyDescriptor, PropertyKey,
};

/// Hex-encoded SHA-256 over a canonical encoding of a value graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StructuralDigest(String);

impl StructuralDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StructuralDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source and clone digests side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneWitness {
    pub source_digest: StructuralDigest,
    pub clone_digest: StructuralDigest,
    pub matches: bool,
}

impl CloneWitness {
    pub fn new(source_digest: StructuralDigest, clone_digest: StructuralDigest) -> Self {
        let matches = source_digest == clone_digest;
        Self {
            source_digest,
            clone_digest,
            matches,
        }
    }
}

struct DigestWriter<'h> {
    heap: &'h ObjectHeap,
    hasher: Sha256,
    numbering: BTreeMap<ObjectHandle, u64>,
    work_stack: Vec<ObjectHandle>,
}

impl<'h> DigestWriter<'h> {
    fn emit(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn emit_str(&mut self, tag: &str, s: &str) {
        self.emit(format!("{tag}{}:", s.len()).as_bytes());
        self.emit(s.as_bytes());
        self.emit(b";");
    }

    fn value(&mut self, value: &JsValue) {
        match value {
            JsValue::Undefined => self.emit(b"u;"),
            JsValue::Null => self.emit(b"n;"),
            JsValue::Bool(b) => self.emit(if *b { b"b1;" } else { b"b0;" }),
            JsValue::Int(n) => self.emit(format!("i{n};").as_bytes()),
            JsValue::Str(s) => self.emit_str("s", s),
            JsValue::Symbol(id) => self.emit(format!("y{};", id.0).as_bytes()),
            JsValue::Object(handle) => {
                if let Some(n) = self.numbering.get(handle) {
                    let tag = format!("r{n};");
                    self.emit(tag.as_bytes());
                } else {
                    let n = self.numbering.len() as u64;
                    self.numbering.insert(*handle, n);
                    self.work_stack.push(*handle);
                    self.emit(format!("o{n};").as_bytes());
                }
            }
        }
    }

    fn handle_ref(&mut self, tag: &str, handle: Option<ObjectHandle>) {
        match handle {
            Some(h) => self.emit(format!("{tag}{};", h.0).as_bytes()),
            None => self.emit(format!("{tag}-;").as_bytes()),
        }
    }

    fn key(&mut self, key: &PropertyKey) {
        match key {
            PropertyKey::String(s) => self.emit_str("ks", s),
            PropertyKey::Symbol(id) => self.emit(format!("ky{};", id.0).as_bytes()),
        }
    }

    fn descriptor(&mut self, desc: &PropertyDescriptor) {
        let flag = |b: bool| if b { '1' } else { '0' };
        match desc {
            PropertyDescriptor::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => {
                let flags = format!("d{}{}{};", flag(*writable), flag(*enumerable), flag(*configurable));
                self.emit(flags.as_bytes());
                self.value(value);
            }
            PropertyDescriptor::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => {
                let flags = format!("a{}{};", flag(*enumerable), flag(*configurable));
                self.emit(flags.as_bytes());
                self.handle_ref("g", *get);
                self.handle_ref("s", *set);
            }
        }
    }

    fn expand(&mut self, handle: ObjectHandle) {
        let heap = self.heap;
        let n = self.numbering.get(&handle).copied().unwrap_or_default();
        self.emit(format!("#{n}{{").as_bytes());

        let obj = match heap.get(handle) {
            Err(_) => {
                self.emit(b"missing}");
                return;
            }
            Ok(ManagedObject::Proxy(_)) => {
                self.handle_ref("proxy", Some(handle));
                self.emit(b"}");
                return;
            }
            Ok(ManagedObject::Ordinary(o)) => o,
        };

        match &obj.kind {
            ObjectKind::Ordinary => self.emit(b"obj;"),
            ObjectKind::Array => self.emit(b"arr;"),
            ObjectKind::Date(time) => {
                self.emit(format!("date{time};}}").as_bytes());
                return;
            }
            ObjectKind::Function(data) => {
                self.emit_str("fn", &declaration_source(&data.source));
                self.emit(b"}");
                return;
            }
            ObjectKind::HostNode(data) => {
                self.emit_str("node", &data.node_name);
                for (name, value) in &data.attributes {
                    self.emit_str("an", name);
                    self.emit_str("av", value);
                }
                for child in &data.children {
                    self.value(&JsValue::Object(*child));
                }
                self.emit(b"}");
                return;
            }
        }

        self.handle_ref("p", obj.prototype);
        for key in obj.own_property_keys() {
            if let Some(desc) = obj.get_own_property(&key) {
                self.key(&key);
                self.descriptor(desc);
            }
        }
        self.emit(b"}");
    }
}

/// Digest the graph reachable from `value`.
pub fn structural_digest(heap: &ObjectHeap, value: &JsValue) -> StructuralDigest {
    let mut writer = DigestWriter {
        heap,
        hasher: Sha256::new(),
        numbering: BTreeMap::new(),
        work_stack: Vec::new(),
    };
    writer.value(value);
    while let Some(handle) = writer.work_stack.pop() {
        writer.expand(handle);
    }
    StructuralDigest(hex::encode(writer.hasher.finalize()))
}
