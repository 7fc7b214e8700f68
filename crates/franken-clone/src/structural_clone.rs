//! Structural deep cloning of value graphs.
//!
//! The dispatcher classifies each value and routes it:
//!
//! - primitives and opaque values (proxies, objects whose `constructor` is
//!   neither callable nor absent) are returned unchanged;
//! - host nodes are duplicated by the [`CloneHost`];
//! - dates become new dates with the same time value;
//! - callables are re-synthesized from their source by the host, then receive
//!   every own descriptor of the original;
//! - arrays and generic objects go to the structural copier.
//!
//! The structural copier allocates the new container (an empty array, or an
//! object sharing the original's prototype), records it in the session's
//! identity map, and queues the original's own keys on an explicit work stack.
//! Each key's value is dispatched and its descriptor merged onto the copy with
//! [`define_prop`].  Because every composite is registered before its members
//! are visited, cycles and shared references resolve to the copy already made.
//!
//! The identity map lives in a [`CloneSession`] created per call.  Nothing is
//! shared across calls.  Getters and proxy traps never run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::callable_source::{SynthesisError, declaration_source};
use crate::classify::{ContainerShape, ValueCategory, classify};
use crate::descriptor_transfer::define_prop;
use crate::host::{CloneHost, DetachedHost};
use crate::object_model::{
    JsValue, ObjectError, ObjectHandle, ObjectHeap, ObjectKind, PartialDescriptor,
    PropertyDescriptor, PropertyKey,
};
use crate::structural_digest::{CloneWitness, structural_digest};

const COMPONENT: &str = "structural_clone";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do with function values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallablePolicy {
    /// Rebuild each function from its source text through the host.
    #[default]
    Resynthesize,
    /// Treat functions as immutable and return the same reference.
    Share,
}

/// Cloner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Copied into every emitted event.
    pub trace_id: String,
    pub callable_policy: CallablePolicy,
    /// Digest source and clone and attach a [`CloneWitness`] to the report.
    pub emit_witness: bool,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            trace_id: "clone".to_string(),
            callable_policy: CallablePolicy::Resynthesize,
            emit_witness: false,
        }
    }
}

impl CloneConfig {
    /// Configuration that also produces a structural witness.
    pub fn verified() -> Self {
        Self {
            emit_witness: true,
            ..Self::default()
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_callable_policy(mut self, policy: CallablePolicy) -> Self {
        self.callable_policy = policy;
        self
    }
}

// ---------------------------------------------------------------------------
// Report, events, errors
// ---------------------------------------------------------------------------

/// Counters for one clone call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneStats {
    pub primitives: u64,
    pub containers: u64,
    pub constructed: u64,
    pub temporals: u64,
    pub callables_synthesized: u64,
    pub callables_shared: u64,
    pub host_nodes: u64,
    pub passthroughs: u64,
    /// Values that resolved to an already-made copy.
    pub identity_hits: u64,
    pub properties_defined: u64,
    pub properties_skipped: u64,
}

/// Structured clone event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneEvent {
    pub trace_id: String,
    pub component: String,
    pub event: String,
    pub outcome: String,
    pub error_code: Option<String>,
    /// The value or property the event concerns.
    pub subject: Option<String>,
}

/// Result of a successful clone call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneReport {
    pub value: JsValue,
    pub stats: CloneStats,
    pub events: Vec<CloneEvent>,
    pub witness: Option<CloneWitness>,
}

impl CloneReport {
    /// Events as JSON lines.
    pub fn events_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Clone failure.  No partial result is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CloneError {
    #[error("callable {handle} could not be re-synthesized: {source}")]
    CallableSynthesis {
        handle: ObjectHandle,
        #[source]
        source: SynthesisError,
    },
    #[error("object model error during clone: {0}")]
    Object(#[from] ObjectError),
}

impl CloneError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CallableSynthesis { .. } => "FE-CLONE-0001",
            Self::Object(_) => "FE-CLONE-0005",
        }
    }
}

const PASSTHROUGH_CODE: &str = "FE-CLONE-0002";
const PROPERTY_SKIPPED_CODE: &str = "FE-CLONE-0003";
const WITNESS_MISMATCH_CODE: &str = "FE-CLONE-0004";

fn event(config: &CloneConfig, event: &str, outcome: &str, subject: Option<String>) -> CloneEvent {
    CloneEvent {
        trace_id: config.trace_id.clone(),
        component: COMPONENT.to_string(),
        event: event.to_string(),
        outcome: outcome.to_string(),
        error_code: None,
        subject,
    }
}

fn coded_event(
    config: &CloneConfig,
    name: &str,
    outcome: &str,
    error_code: &str,
    subject: Option<String>,
) -> CloneEvent {
    CloneEvent {
        error_code: Some(error_code.to_string()),
        ..event(config, name, outcome, subject)
    }
}

// ---------------------------------------------------------------------------
// CloneSession: per-call state
// ---------------------------------------------------------------------------

/// Own keys of `original` still to be transferred onto `copy`.
#[derive(Debug)]
struct PendingCopy {
    original: ObjectHandle,
    copy: ObjectHandle,
    keys: Vec<PropertyKey>,
    next: usize,
}

/// State for a single clone call: the identity map, the work stack, counters
/// and events.  Dropped when the call returns.
pub struct CloneSession<'a, H: CloneHost + ?Sized> {
    heap: &'a mut ObjectHeap,
    host: &'a mut H,
    config: &'a CloneConfig,
    identity: BTreeMap<ObjectHandle, ObjectHandle>,
    work_stack: Vec<PendingCopy>,
    stats: CloneStats,
    events: Vec<CloneEvent>,
}

impl<'a, H: CloneHost + ?Sized> CloneSession<'a, H> {
    pub fn new(heap: &'a mut ObjectHeap, host: &'a mut H, config: &'a CloneConfig) -> Self {
        Self {
            heap,
            host,
            config,
            identity: BTreeMap::new(),
            work_stack: Vec::new(),
            stats: CloneStats::default(),
            events: Vec::new(),
        }
    }

    /// Copy made for `original` so far in this session.
    pub fn copy_of(&self, original: ObjectHandle) -> Option<ObjectHandle> {
        self.identity.get(&original).copied()
    }

    /// Clone `root` and everything reachable from it.
    pub fn run(&mut self, root: &JsValue) -> Result<JsValue, CloneError> {
        let cloned = self.dispatch(root)?;
        while let Some(frame) = self.work_stack.last_mut() {
            let Some(key) = frame.keys.get(frame.next).cloned() else {
                self.work_stack.pop();
                continue;
            };
            frame.next += 1;
            let (original, copy) = (frame.original, frame.copy);
            self.transfer_property(original, copy, key)?;
        }
        Ok(cloned)
    }

    fn register(&mut self, original: ObjectHandle, copy: ObjectHandle) {
        self.identity.insert(original, copy);
    }

    fn dispatch(&mut self, value: &JsValue) -> Result<JsValue, CloneError> {
        if let JsValue::Object(handle) = value
            && let Some(copy) = self.copy_of(*handle)
        {
            self.stats.identity_hits += 1;
            return Ok(JsValue::Object(copy));
        }

        let category = classify(self.heap, value);
        let handle = match (category, value) {
            (ValueCategory::Primitive, _) => {
                self.stats.primitives += 1;
                return Ok(value.clone());
            }
            (ValueCategory::Opaque(reason), _) => {
                self.stats.passthroughs += 1;
                self.events.push(coded_event(
                    self.config,
                    "opaque_passthrough",
                    "skip",
                    PASSTHROUGH_CODE,
                    Some(format!("{value} ({reason})")),
                ));
                return Ok(value.clone());
            }
            (_, JsValue::Object(handle)) => *handle,
            // Only objects classify as anything but Primitive.
            (_, _) => return Ok(value.clone()),
        };

        let copy = match category {
            ValueCategory::HostNode => self.clone_host_node(handle)?,
            ValueCategory::Temporal => self.clone_date(handle)?,
            ValueCategory::Callable => match self.config.callable_policy {
                CallablePolicy::Share => {
                    self.stats.callables_shared += 1;
                    return Ok(value.clone());
                }
                CallablePolicy::Resynthesize => self.clone_callable(handle)?,
            },
            ValueCategory::Container(shape) => {
                self.stats.containers += 1;
                self.begin_structural(handle, shape)?
            }
            ValueCategory::Constructed(shape) => {
                self.stats.constructed += 1;
                self.begin_structural(handle, shape)?
            }
            ValueCategory::Primitive | ValueCategory::Opaque(_) => handle,
        };
        Ok(JsValue::Object(copy))
    }

    fn clone_host_node(&mut self, handle: ObjectHandle) -> Result<ObjectHandle, CloneError> {
        let copy = self.host.deep_duplicate_node(self.heap, handle)?;
        self.register(handle, copy);
        self.stats.host_nodes += 1;
        self.events.push(event(
            self.config,
            "host_node_duplicated",
            "pass",
            Some(handle.to_string()),
        ));
        Ok(copy)
    }

    fn clone_date(&mut self, handle: ObjectHandle) -> Result<ObjectHandle, CloneError> {
        let time = match self.heap.kind(handle)? {
            ObjectKind::Date(time) => *time,
            other => {
                return Err(CloneError::Object(ObjectError::TypeError(format!(
                    "{handle} is a {} not a date",
                    other.name()
                ))));
            }
        };
        let copy = self.heap.alloc_date(time);
        self.register(handle, copy);
        self.stats.temporals += 1;
        Ok(copy)
    }

    fn clone_callable(&mut self, handle: ObjectHandle) -> Result<ObjectHandle, CloneError> {
        let source = match self.heap.kind(handle)? {
            ObjectKind::Function(data) => declaration_source(&data.source).into_owned(),
            other => {
                return Err(CloneError::Object(ObjectError::TypeError(format!(
                    "{handle} is a {} not a function",
                    other.name()
                ))));
            }
        };

        let copy = match self.host.synthesize_callable(self.heap, &source, handle) {
            Ok(copy) => copy,
            Err(err) => {
                self.events.push(coded_event(
                    self.config,
                    "callable_resynthesis",
                    "fail",
                    err.code(),
                    Some(handle.to_string()),
                ));
                return Err(CloneError::CallableSynthesis {
                    handle,
                    source: err,
                });
            }
        };
        self.register(handle, copy);
        self.stats.callables_synthesized += 1;

        // Own properties (static fields, `prototype`, ...) are shared, not cloned.
        for (key, desc) in self.heap.get_own_property_descriptors(handle)? {
            if matches!(self.heap.define_property(copy, key.clone(), desc), Ok(true)) {
                self.stats.properties_defined += 1;
            } else {
                self.skip_property(copy, &key);
            }
        }
        self.events.push(event(
            self.config,
            "callable_resynthesis",
            "pass",
            Some(handle.to_string()),
        ));
        Ok(copy)
    }

    fn begin_structural(
        &mut self,
        handle: ObjectHandle,
        shape: ContainerShape,
    ) -> Result<ObjectHandle, CloneError> {
        let mut keys = self.heap.own_keys(handle)?;
        let copy = match shape {
            ContainerShape::Sequence => {
                // The new array's own `length` follows from the indices defined on it.
                keys.retain(|key| !matches!(key, PropertyKey::String(s) if s == "length"));
                self.heap.alloc_array(Vec::new())
            }
            ContainerShape::Mapping => {
                let prototype = self.heap.get_prototype_of(handle)?;
                self.heap.alloc(prototype)
            }
        };
        self.register(handle, copy);
        self.work_stack.push(PendingCopy {
            original: handle,
            copy,
            keys,
            next: 0,
        });
        Ok(copy)
    }

    fn transfer_property(
        &mut self,
        original: ObjectHandle,
        copy: ObjectHandle,
        key: PropertyKey,
    ) -> Result<(), CloneError> {
        let Some(desc) = self.heap.get_own_property_descriptor(original, &key)? else {
            return Ok(());
        };
        let partial = match &desc {
            PropertyDescriptor::Data { value, .. } => PartialDescriptor::value(self.dispatch(value)?),
            // Getters are not run; the accessor pair comes across by reference.
            PropertyDescriptor::Accessor { .. } => PartialDescriptor::default(),
        };
        if define_prop(self.heap, copy, key.clone(), partial, Some(original)) {
            self.stats.properties_defined += 1;
        } else {
            self.skip_property(copy, &key);
        }
        Ok(())
    }

    fn skip_property(&mut self, copy: ObjectHandle, key: &PropertyKey) {
        self.stats.properties_skipped += 1;
        self.events.push(coded_event(
            self.config,
            "property_skipped",
            "skip",
            PROPERTY_SKIPPED_CODE,
            Some(format!("{copy}.{key}")),
        ));
    }

    fn finish(self) -> (CloneStats, Vec<CloneEvent>) {
        (self.stats, self.events)
    }
}

// ---------------------------------------------------------------------------
// StructuralCloner: public entry point
// ---------------------------------------------------------------------------

/// Deep-clones value graphs on an [`ObjectHeap`].
#[derive(Debug, Clone, Default)]
pub struct StructuralCloner {
    config: CloneConfig,
}

impl StructuralCloner {
    pub fn new(config: CloneConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CloneConfig {
        &self.config
    }

    /// Clone `value`, delegating host nodes and callables to `host`.
    ///
    /// The original graph is not mutated.  The only failures are callable
    /// re-synthesis and heap errors raised by a host.
    pub fn clone_value<H: CloneHost + ?Sized>(
        &self,
        heap: &mut ObjectHeap,
        host: &mut H,
        value: &JsValue,
    ) -> Result<CloneReport, CloneError> {
        let source_digest = self
            .config
            .emit_witness
            .then(|| structural_digest(heap, value));

        let mut session = CloneSession::new(heap, host, &self.config);
        let cloned = session.run(value)?;
        let (stats, mut events) = session.finish();

        let witness = source_digest.map(|source| {
            let witness = CloneWitness::new(source, structural_digest(heap, &cloned));
            events.push(if witness.matches {
                event(&self.config, "witness_check", "pass", None)
            } else {
                coded_event(
                    &self.config,
                    "witness_check",
                    "fail",
                    WITNESS_MISMATCH_CODE,
                    Some(format!(
                        "{} != {}",
                        witness.source_digest, witness.clone_digest
                    )),
                )
            });
            witness
        });

        events.push(event(
            &self.config,
            "clone_complete",
            "pass",
            Some(cloned.to_string()),
        ));
        Ok(CloneReport {
            value: cloned,
            stats,
            events,
            witness,
        })
    }
}

/// Clone `value` with the default configuration and a [`DetachedHost`].
pub fn structural_clone(heap: &mut ObjectHeap, value: &JsValue) -> Result<JsValue, CloneError> {
    StructuralCloner::default()
        .clone_value(heap, &mut DetachedHost::new(), value)
        .map(|report| report.value)
}
