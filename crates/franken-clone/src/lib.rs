#![forbid(unsafe_code)]

//! Structural deep cloning for ES-style value graphs.
//!
//! A clone has the same shape, property descriptors, prototype links and
//! sharing pattern as its source, and no aliasing back into the source's
//! containers.  Proxies and other values that cannot be introspected without
//! side effects are passed through by reference.

pub mod callable_source;
pub mod classify;
pub mod descriptor_transfer;
pub mod host;
pub mod object_model;
pub mod structural_clone;
pub mod structural_digest;

pub use classify::{ValueCategory, classify};
pub use descriptor_transfer::{can_redefine, define_prop};
pub use host::{CloneHost, DetachedHost};
pub use object_model::{JsValue, ObjectHandle, ObjectHeap};
pub use structural_clone::{
    CallablePolicy, CloneConfig, CloneError, CloneReport, StructuralCloner, structural_clone,
};
pub use structural_digest::{CloneWitness, StructuralDigest, structural_digest};
