//! ES2020 object model for structural cloning.
//!
//! Value graphs live in an [`ObjectHeap`] arena and are addressed through
//! [`ObjectHandle`] identity tokens.  Key features:
//!
//! - **Property descriptors**: data vs accessor, configurable/enumerable/writable
//! - **Prototype chains**: `[[Prototype]]` internal slot with chain traversal
//! - **Object kinds**: ordinary, array (exotic `length`), date, function, host node
//! - **Proxy**: interception wrappers whose traps are never run by the heap
//! - **Symbol keys**: property keys that are either strings or symbols
//! - **Realm intrinsics**: `Object`/`Array`/`Function`/`Date` and their prototypes
//!
//! Own keys follow ES2020 `[[OwnPropertyKeys]]` order: array indices ascending,
//! then string keys in insertion order, then symbols in insertion order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// PropertyKey: string or symbol
// ---------------------------------------------------------------------------

/// Unique symbol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// A property key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    /// String key.
    String(String),
    /// Symbol key.
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Array index encoded by this key, if it is a canonical index string
    /// (`"0"`, `"17"`, never `"01"`), below `2^32 - 1`.
    pub fn array_index(&self) -> Option<u32> {
        match self {
            Self::String(s) => array_index(s),
            Self::Symbol(_) => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(id: SymbolId) -> Self {
        Self::Symbol(id)
    }
}

fn array_index(s: &str) -> Option<u32> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match s.parse::<u32>() {
        Ok(n) if n != u32::MAX => Some(n),
        _ => None,
    }
}

fn index_key(index: u32) -> PropertyKey {
    PropertyKey::String(index.to_string())
}

// ---------------------------------------------------------------------------
// ObjectHandle: typed reference to heap objects
// ---------------------------------------------------------------------------

/// Opaque handle referencing an object on the managed heap.
///
/// Two values refer to the same object exactly when their handles are equal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Handle for arena slot `index`.  Slots past `u32::MAX` saturate.
fn handle_for_slot(index: usize) -> ObjectHandle {
    ObjectHandle(u32::try_from(index).unwrap_or(u32::MAX))
}

// ---------------------------------------------------------------------------
// JsValue: runtime value for the object model
// ---------------------------------------------------------------------------

/// Runtime value.  Everything except `Object` is a primitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Symbol(SymbolId),
    Object(ObjectHandle),
}

impl JsValue {
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_object()
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(h) => Some(*h),
            _ => None,
        }
    }

    /// SameValue comparison (ES2020 §7.2.10).
    pub fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
            Self::Object(h) => write!(f, "[object#{}]", h.0),
        }
    }
}

impl From<i64> for JsValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<ObjectHandle> for JsValue {
    fn from(h: ObjectHandle) -> Self {
        Self::Object(h)
    }
}

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

/// ES2020 property descriptor (§6.2.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyDescriptor {
    /// Data descriptor: has `value` and `writable`.
    Data {
        value: JsValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    /// Accessor descriptor: has `get` and/or `set`.
    Accessor {
        get: Option<ObjectHandle>,
        set: Option<ObjectHandle>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// Create a default data descriptor (writable, enumerable, configurable).
    pub fn data(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Create a non-writable, non-enumerable, non-configurable data descriptor.
    pub fn data_frozen(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    /// Built-in method shape: writable, configurable, not enumerable.
    pub fn data_hidden(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Is this descriptor configurable?
    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    /// Is this descriptor enumerable?
    pub fn is_enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    /// Is this a data descriptor?
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    /// Is this an accessor descriptor?
    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }

    /// Get the value if this is a data descriptor.
    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Is this a data descriptor with writable=true?
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { writable, .. } => *writable,
            Self::Accessor { .. } => false,
        }
    }

    /// Make this descriptor non-configurable.
    pub fn set_non_configurable(&mut self) {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => {
                *configurable = false;
            }
        }
    }

    /// Make this data descriptor non-writable (no-op for accessors).
    pub fn set_non_writable(&mut self) {
        if let Self::Data { writable, .. } = self {
            *writable = false;
        }
    }
}

/// A descriptor with every attribute optional, as passed to
/// `Object.defineProperty` before `ToPropertyDescriptor` fills the gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDescriptor {
    pub get: Option<ObjectHandle>,
    pub set: Option<ObjectHandle>,
    pub value: Option<JsValue>,
    pub writable: Option<bool>,
    pub enumerable: Option<bool>,
    pub configurable: Option<bool>,
}

impl PartialDescriptor {
    /// Descriptor carrying only a value.
    pub fn value(value: JsValue) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// Does this descriptor name a getter or setter?
    pub fn has_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// Neither data nor accessor fields present.
    pub fn is_generic(&self) -> bool {
        !self.has_accessor() && self.value.is_none() && self.writable.is_none()
    }

    /// Complete this descriptor over the `current` own descriptor: present
    /// fields win, absent fields keep the current attribute, and attributes
    /// absent from both default to `false` / `undefined`.
    pub fn complete_over(self, current: Option<&PropertyDescriptor>) -> PropertyDescriptor {
        let enumerable = self
            .enumerable
            .or(current.map(PropertyDescriptor::is_enumerable))
            .unwrap_or(false);
        let configurable = self
            .configurable
            .or(current.map(PropertyDescriptor::is_configurable))
            .unwrap_or(false);

        let accessor = self.has_accessor()
            || (self.is_generic() && current.is_some_and(PropertyDescriptor::is_accessor));
        if accessor {
            let (cur_get, cur_set) = match current {
                Some(PropertyDescriptor::Accessor { get, set, .. }) => (*get, *set),
                _ => (None, None),
            };
            PropertyDescriptor::Accessor {
                get: self.get.or(cur_get),
                set: self.set.or(cur_set),
                enumerable,
                configurable,
            }
        } else {
            let (cur_value, cur_writable) = match current {
                Some(PropertyDescriptor::Data {
                    value, writable, ..
                }) => (Some(value.clone()), Some(*writable)),
                _ => (None, None),
            };
            PropertyDescriptor::Data {
                value: self.value.or(cur_value).unwrap_or(JsValue::Undefined),
                writable: self.writable.or(cur_writable).unwrap_or(false),
                enumerable,
                configurable,
            }
        }
    }
}

impl From<&PropertyDescriptor> for PartialDescriptor {
    fn from(desc: &PropertyDescriptor) -> Self {
        match desc {
            PropertyDescriptor::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => Self {
                value: Some(value.clone()),
                writable: Some(*writable),
                enumerable: Some(*enumerable),
                configurable: Some(*configurable),
                ..Self::default()
            },
            PropertyDescriptor::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => Self {
                get: *get,
                set: *set,
                enumerable: Some(*enumerable),
                configurable: Some(*configurable),
                ..Self::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectError
// ---------------------------------------------------------------------------

/// Errors from object model operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectError {
    /// ECMAScript TypeError.
    TypeError(String),
    /// Object not found in the heap.
    ObjectNotFound(ObjectHandle),
    /// Proxy has been revoked.
    ProxyRevoked,
    /// Prototype chain cycle detected.
    PrototypeCycleDetected,
    /// Maximum prototype chain depth exceeded.
    PrototypeChainTooDeep { depth: u32, max: u32 },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeError(msg) => write!(f, "TypeError: {msg}"),
            Self::ObjectNotFound(h) => write!(f, "object#{} not found", h.0),
            Self::ProxyRevoked => write!(f, "TypeError: proxy has been revoked"),
            Self::PrototypeCycleDetected => write!(f, "TypeError: prototype chain cycle detected"),
            Self::PrototypeChainTooDeep { depth, max } => {
                write!(
                    f,
                    "TypeError: prototype chain depth {depth} exceeds max {max}"
                )
            }
        }
    }
}

impl std::error::Error for ObjectError {}

// ---------------------------------------------------------------------------
// PropertyTable: own properties with insertion order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct PropertySlot {
    order: u64,
    descriptor: PropertyDescriptor,
}

/// Own properties keyed by [`PropertyKey`], remembering insertion order.
///
/// Serialized as a sequence of `[key, descriptor]` pairs in insertion order:
/// serde_json requires string map keys but `PropertyKey` is an enum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTable {
    slots: BTreeMap<PropertyKey, PropertySlot>,
    next_order: u64,
}

impl PropertyTable {
    pub fn get(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.slots.get(key).map(|slot| &slot.descriptor)
    }

    pub fn get_mut(&mut self, key: &PropertyKey) -> Option<&mut PropertyDescriptor> {
        self.slots.get_mut(key).map(|slot| &mut slot.descriptor)
    }

    pub fn contains_key(&self, key: &PropertyKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Insert or replace.  Replacing keeps the key's original position.
    pub fn insert(&mut self, key: PropertyKey, descriptor: PropertyDescriptor) {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.descriptor = descriptor;
            return;
        }
        let order = self.next_order;
        self.next_order += 1;
        self.slots.insert(key, PropertySlot { order, descriptor });
    }

    pub fn remove(&mut self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.slots.remove(key).map(|slot| slot.descriptor)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.slots.values().map(|slot| &slot.descriptor)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut PropertyDescriptor> {
        self.slots.values_mut().map(|slot| &mut slot.descriptor)
    }

    /// Keys in insertion order.
    pub fn insertion_order(&self) -> Vec<PropertyKey> {
        let mut keyed: Vec<(u64, &PropertyKey)> =
            self.slots.iter().map(|(k, slot)| (slot.order, k)).collect();
        keyed.sort_by_key(|(order, _)| *order);
        keyed.into_iter().map(|(_, k)| k.clone()).collect()
    }

    /// `[[OwnPropertyKeys]]` order: integer indices ascending, then string
    /// keys in insertion order, then symbol keys in insertion order.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut int_keys: Vec<(u32, PropertyKey)> = Vec::new();
        let mut str_keys: Vec<PropertyKey> = Vec::new();
        let mut sym_keys: Vec<PropertyKey> = Vec::new();

        for key in self.insertion_order() {
            match &key {
                PropertyKey::String(s) => match array_index(s) {
                    Some(n) => int_keys.push((n, key)),
                    None => str_keys.push(key),
                },
                PropertyKey::Symbol(_) => sym_keys.push(key),
            }
        }

        int_keys.sort_by_key(|(n, _)| *n);
        let mut result: Vec<PropertyKey> = int_keys.into_iter().map(|(_, k)| k).collect();
        result.extend(str_keys);
        result.extend(sym_keys);
        result
    }
}

impl Serialize for PropertyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(PropertyKey, &PropertyDescriptor)> = self
            .insertion_order()
            .into_iter()
            .filter_map(|k| self.get(&k).map(|d| (k, d)))
            .collect();
        pairs.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PropertyTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs: Vec<(PropertyKey, PropertyDescriptor)> = Vec::deserialize(deserializer)?;
        let mut table = Self::default();
        for (key, descriptor) in pairs {
            table.insert(key, descriptor);
        }
        Ok(table)
    }
}

// ---------------------------------------------------------------------------
// ObjectKind: internal slots that distinguish exotic objects
// ---------------------------------------------------------------------------

/// Latest instant a Date can hold, in ms from the epoch (ES2020 §20.4.1.1).
pub const MAX_TIME_MS: i64 = 8_640_000_000_000_000;

/// `[[DateValue]]`: milliseconds since the epoch, or an invalid date (NaN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeValue(Option<i64>);

impl TimeValue {
    /// `TimeClip`: out-of-range instants become an invalid date.
    pub fn from_epoch_ms(ms: i64) -> Self {
        if ms.abs() > MAX_TIME_MS {
            Self(None)
        } else {
            Self(Some(ms))
        }
    }

    pub fn invalid() -> Self {
        Self(None)
    }

    /// `Date.prototype.valueOf`; `None` stands for NaN.
    pub fn value_of(self) -> Option<i64> {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ms) => write!(f, "{ms}"),
            None => f.write_str("NaN"),
        }
    }
}

/// Function internal state: its source text as `Function.prototype.toString`
/// would render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionData {
    pub source: String,
    /// Built-in functions render as `[native code]` and cannot be re-parsed.
    pub native: bool,
}

/// A host-environment tree node (a document element, say).
///
/// Only the host knows how to duplicate these; the object model just stores
/// enough for a host to do so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNodeData {
    pub node_name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<ObjectHandle>,
}

impl HostNodeData {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Which exotic internal slots an ordinary object carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Ordinary,
    Array,
    Date(TimeValue),
    Function(FunctionData),
    HostNode(HostNodeData),
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ordinary => "object",
            Self::Array => "array",
            Self::Date(_) => "date",
            Self::Function(_) => "function",
            Self::HostNode(_) => "host_node",
        }
    }
}

// ---------------------------------------------------------------------------
// OrdinaryObject: the core ES2020 object
// ---------------------------------------------------------------------------

/// Maximum prototype chain depth to prevent infinite loops.
pub const MAX_PROTOTYPE_CHAIN_DEPTH: u32 = 1024;

/// An ordinary ES2020 object with internal slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinaryObject {
    /// `[[Prototype]]` internal slot (null means end of chain).
    pub prototype: Option<ObjectHandle>,
    /// `[[Extensible]]` internal slot.
    pub extensible: bool,
    /// Own properties with descriptors.
    pub properties: PropertyTable,
    pub kind: ObjectKind,
}

impl Default for OrdinaryObject {
    fn default() -> Self {
        Self {
            prototype: None,
            extensible: true,
            properties: PropertyTable::default(),
            kind: ObjectKind::Ordinary,
        }
    }
}

impl OrdinaryObject {
    /// Create a new ordinary object with the given prototype.
    pub fn with_prototype(proto: Option<ObjectHandle>) -> Self {
        Self {
            prototype: proto,
            ..Self::default()
        }
    }

    /// Create an object with the given kind.  Arrays start with their own
    /// `length` of 0 (writable, non-enumerable, non-configurable).
    pub fn with_kind(proto: Option<ObjectHandle>, kind: ObjectKind) -> Self {
        let mut obj = Self {
            prototype: proto,
            kind,
            ..Self::default()
        };
        if obj.is_array() {
            obj.properties.insert(
                PropertyKey::from("length"),
                PropertyDescriptor::Data {
                    value: JsValue::Int(0),
                    writable: true,
                    enumerable: false,
                    configurable: false,
                },
            );
        }
        obj
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array)
    }

    // -- [[GetOwnProperty]] (§9.1.1) ---------------------------------------

    /// `[[GetOwnProperty]](P)`: return the own property descriptor for `key`.
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    // -- [[DefineOwnProperty]] (§9.1.6, §9.4.2.1) --------------------------

    /// `[[DefineOwnProperty]](P, Desc)`: define or update a property.
    ///
    /// Returns `Ok(true)` if the property was successfully defined,
    /// `Ok(false)` if rejected (non-configurable conflict, non-extensible
    /// object, frozen array length), or `Err` for type errors.
    pub fn define_own_property(
        &mut self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        if self.is_array() {
            if matches!(&key, PropertyKey::String(s) if s == "length") {
                return self.define_array_length(key, desc);
            }
            if let Some(index) = key.array_index() {
                let (length, length_writable) = self.array_length();
                if index >= length && !length_writable {
                    return Ok(false);
                }
                if !self.define_ordinary(key, desc)? {
                    return Ok(false);
                }
                if index >= length {
                    self.store_array_length(index + 1);
                }
                return Ok(true);
            }
        }
        self.define_ordinary(key, desc)
    }

    fn define_ordinary(
        &mut self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        if let Some(current) = self.properties.get(&key) {
            // Existing property: check compatibility.
            if !current.is_configurable() {
                if desc.is_configurable() {
                    return Ok(false);
                }
                if desc.is_enumerable() != current.is_enumerable() {
                    return Ok(false);
                }
                if current.is_data() != desc.is_data() {
                    return Ok(false);
                }
                if let (
                    PropertyDescriptor::Data {
                        writable: current_w,
                        value: current_v,
                        ..
                    },
                    PropertyDescriptor::Data {
                        writable: new_w,
                        value: new_v,
                        ..
                    },
                ) = (current, &desc)
                    && !current_w
                {
                    // Non-writable non-configurable: cannot become writable.
                    if *new_w {
                        return Ok(false);
                    }
                    // Non-writable non-configurable: cannot change value.
                    if !current_v.same_value(new_v) {
                        return Ok(false);
                    }
                }
                if let (
                    PropertyDescriptor::Accessor {
                        get: cur_get,
                        set: cur_set,
                        ..
                    },
                    PropertyDescriptor::Accessor {
                        get: new_get,
                        set: new_set,
                        ..
                    },
                ) = (current, &desc)
                    && (cur_get != new_get || cur_set != new_set)
                {
                    return Ok(false);
                }
            }
            self.properties.insert(key, desc);
            Ok(true)
        } else {
            if !self.extensible {
                return Ok(false);
            }
            self.properties.insert(key, desc);
            Ok(true)
        }
    }

    /// Current `length` and whether it is writable.
    fn array_length(&self) -> (u32, bool) {
        match self.properties.get(&PropertyKey::from("length")) {
            Some(PropertyDescriptor::Data {
                value: JsValue::Int(n),
                writable,
                ..
            }) => (u32::try_from(*n).unwrap_or(u32::MAX), *writable),
            Some(desc) => (0, desc.is_writable()),
            None => (0, true),
        }
    }

    fn store_array_length(&mut self, length: u32) {
        if let Some(PropertyDescriptor::Data { value, .. }) =
            self.properties.get_mut(&PropertyKey::from("length"))
        {
            *value = JsValue::Int(i64::from(length));
        }
    }

    /// ArraySetLength (§9.4.2.4): shrinking deletes trailing indices and stops
    /// at the first one that refuses deletion.
    fn define_array_length(
        &mut self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        let new_len = match &desc {
            PropertyDescriptor::Data {
                value: JsValue::Int(n),
                ..
            } => u32::try_from(*n)
                .ok()
                .filter(|n| *n != u32::MAX)
                .ok_or_else(|| ObjectError::TypeError(format!("invalid array length {n}")))?,
            PropertyDescriptor::Data { value, .. } => {
                return Err(ObjectError::TypeError(format!(
                    "invalid array length {value}"
                )));
            }
            PropertyDescriptor::Accessor { .. } => return self.define_ordinary(key, desc),
        };

        let (old_len, writable) = self.array_length();
        if new_len >= old_len {
            return self.define_ordinary(key, desc);
        }
        if !writable {
            return Ok(false);
        }

        let mut doomed: Vec<u32> = self
            .properties
            .own_keys()
            .iter()
            .filter_map(PropertyKey::array_index)
            .filter(|idx| *idx >= new_len)
            .collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        for idx in doomed {
            if !self.delete(&index_key(idx)) {
                self.store_array_length(idx + 1);
                return Ok(false);
            }
        }
        self.define_ordinary(key, desc)
    }

    // -- [[Set]] on own properties (§9.1.9 without receiver walk) ---------

    /// Assign to an own data property or create a new default one.
    /// Non-writable data and accessor properties refuse the write.
    pub fn set(&mut self, key: PropertyKey, value: JsValue) -> Result<bool, ObjectError> {
        match self.properties.get(&key) {
            Some(PropertyDescriptor::Data {
                writable: true,
                enumerable,
                configurable,
                ..
            }) => {
                let desc = PropertyDescriptor::Data {
                    value,
                    writable: true,
                    enumerable: *enumerable,
                    configurable: *configurable,
                };
                self.define_own_property(key, desc)
            }
            // Setter invocation belongs to the interpreter.
            Some(_) => Ok(false),
            None => self.define_own_property(key, PropertyDescriptor::data(value)),
        }
    }

    // -- [[Delete]] (§9.1.10) -----------------------------------------------

    /// `[[Delete]](P)`: delete a property. Returns `false` if non-configurable.
    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        match self.properties.get(key) {
            Some(desc) if !desc.is_configurable() => false,
            Some(_) => {
                self.properties.remove(key);
                true
            }
            None => true,
        }
    }

    // -- [[OwnPropertyKeys]] (§9.1.11) -------------------------------------

    /// `[[OwnPropertyKeys]]()` in ES2020 order.
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        self.properties.own_keys()
    }

    // -- Integrity levels ---------------------------------------------------

    /// `[[PreventExtensions]]()`: makes this object non-extensible.
    pub fn prevent_extensions(&mut self) {
        self.extensible = false;
    }

    /// `Object.freeze` semantics: make all own properties non-configurable
    /// and data properties non-writable.
    pub fn freeze(&mut self) {
        self.extensible = false;
        for desc in self.properties.values_mut() {
            desc.set_non_configurable();
            desc.set_non_writable();
        }
    }

    /// Is this object frozen? (non-extensible + all own properties non-configurable
    /// + all data properties non-writable.)
    pub fn is_frozen(&self) -> bool {
        !self.extensible
            && self
                .properties
                .values()
                .all(|d| !d.is_configurable() && !d.is_writable())
    }
}

// ---------------------------------------------------------------------------
// ProxyObject: ES2020 Proxy
// ---------------------------------------------------------------------------

/// Proxy internal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyObject {
    /// `[[ProxyTarget]]`: the wrapped target object (None if revoked).
    pub target: Option<ObjectHandle>,
    /// `[[ProxyHandler]]`: the handler object (None if revoked).
    pub handler: Option<ObjectHandle>,
}

impl ProxyObject {
    /// Create a new proxy wrapping `target` with `handler`.
    pub fn new(target: ObjectHandle, handler: ObjectHandle) -> Self {
        Self {
            target: Some(target),
            handler: Some(handler),
        }
    }

    /// Revoke this proxy.
    pub fn revoke(&mut self) {
        self.target = None;
        self.handler = None;
    }
}

// ---------------------------------------------------------------------------
// ManagedObject: union of ordinary and proxy
// ---------------------------------------------------------------------------

/// A managed object: either ordinary or a Proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagedObject {
    Ordinary(OrdinaryObject),
    Proxy(ProxyObject),
}

impl ManagedObject {
    /// Get a mutable ordinary object, if this is one.
    pub fn as_ordinary_mut(&mut self) -> Option<&mut OrdinaryObject> {
        match self {
            Self::Ordinary(o) => Some(o),
            Self::Proxy(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Intrinsics: realm built-ins the cloner needs by identity
// ---------------------------------------------------------------------------

/// Realm intrinsics allocated when the heap is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub object_prototype: ObjectHandle,
    pub function_prototype: ObjectHandle,
    pub array_prototype: ObjectHandle,
    pub date_prototype: ObjectHandle,
    pub object_constructor: ObjectHandle,
    pub function_constructor: ObjectHandle,
    pub array_constructor: ObjectHandle,
    pub date_constructor: ObjectHandle,
}

fn native_source(name: &str) -> String {
    format!("function {name}() {{ [native code] }}")
}

// ---------------------------------------------------------------------------
// ObjectHeap: the managed object store
// ---------------------------------------------------------------------------

/// The object heap: arena of managed objects plus realm intrinsics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeap {
    objects: Vec<ManagedObject>,
    intrinsics: Intrinsics,
    next_symbol: u32,
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectHeap {
    /// Create a heap holding only the realm intrinsics.
    pub fn new() -> Self {
        let mut heap = Self {
            objects: Vec::new(),
            intrinsics: Intrinsics::default(),
            next_symbol: 1,
        };
        heap.bootstrap_intrinsics();
        heap
    }

    fn bootstrap_intrinsics(&mut self) {
        let object_prototype = self.push(OrdinaryObject::default());
        let function_prototype = self.push(OrdinaryObject::with_kind(
            Some(object_prototype),
            ObjectKind::Function(FunctionData {
                source: "function () { [native code] }".to_string(),
                native: true,
            }),
        ));
        let array_prototype = self.push(OrdinaryObject::with_prototype(Some(object_prototype)));
        let date_prototype = self.push(OrdinaryObject::with_prototype(Some(object_prototype)));

        let ctor = |heap: &mut Self, name: &str, length: i64, proto: ObjectHandle| {
            let mut f = OrdinaryObject::with_kind(
                Some(function_prototype),
                ObjectKind::Function(FunctionData {
                    source: native_source(name),
                    native: true,
                }),
            );
            f.properties.insert(
                "length".into(),
                PropertyDescriptor::Data {
                    value: JsValue::Int(length),
                    writable: false,
                    enumerable: false,
                    configurable: true,
                },
            );
            f.properties.insert(
                "name".into(),
                PropertyDescriptor::Data {
                    value: JsValue::from(name),
                    writable: false,
                    enumerable: false,
                    configurable: true,
                },
            );
            f.properties.insert(
                "prototype".into(),
                PropertyDescriptor::data_frozen(JsValue::Object(proto)),
            );
            let handle = heap.push(f);
            if let Some(o) = heap.objects[proto.0 as usize].as_ordinary_mut() {
                o.properties.insert(
                    "constructor".into(),
                    PropertyDescriptor::data_hidden(JsValue::Object(handle)),
                );
            }
            handle
        };

        let object_constructor = ctor(self, "Object", 1, object_prototype);
        let function_constructor = ctor(self, "Function", 1, function_prototype);
        let array_constructor = ctor(self, "Array", 1, array_prototype);
        let date_constructor = ctor(self, "Date", 7, date_prototype);

        self.intrinsics = Intrinsics {
            object_prototype,
            function_prototype,
            array_prototype,
            date_prototype,
            object_constructor,
            function_constructor,
            array_constructor,
            date_constructor,
        };
    }

    fn push(&mut self, obj: OrdinaryObject) -> ObjectHandle {
        self.push_managed(ManagedObject::Ordinary(obj))
    }

    fn push_managed(&mut self, obj: ManagedObject) -> ObjectHandle {
        let handle = handle_for_slot(self.objects.len());
        self.objects.push(obj);
        handle
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    // -- Allocation ---------------------------------------------------------

    /// Allocate a new ordinary object with the given prototype
    /// (`Object.create(proto)`).
    pub fn alloc(&mut self, proto: Option<ObjectHandle>) -> ObjectHandle {
        self.push(OrdinaryObject::with_prototype(proto))
    }

    /// Allocate an object of the given kind.
    pub fn alloc_with_kind(&mut self, proto: Option<ObjectHandle>, kind: ObjectKind) -> ObjectHandle {
        self.push(OrdinaryObject::with_kind(proto, kind))
    }

    /// `{}`: a plain object delegating to `Object.prototype`.
    pub fn alloc_object(&mut self) -> ObjectHandle {
        self.alloc(Some(self.intrinsics.object_prototype))
    }

    /// `[...]`: an array delegating to `Array.prototype`.
    pub fn alloc_array(&mut self, elements: Vec<JsValue>) -> ObjectHandle {
        let mut arr =
            OrdinaryObject::with_kind(Some(self.intrinsics.array_prototype), ObjectKind::Array);
        let length = JsValue::Int(i64::try_from(elements.len()).unwrap_or(i64::MAX));
        for (idx, value) in elements.into_iter().enumerate() {
            arr.properties
                .insert(PropertyKey::String(idx.to_string()), PropertyDescriptor::data(value));
        }
        if let Some(PropertyDescriptor::Data { value, .. }) =
            arr.properties.get_mut(&PropertyKey::from("length"))
        {
            *value = length;
        }
        self.push(arr)
    }

    /// `new Date(ms)`.
    pub fn alloc_date(&mut self, time: TimeValue) -> ObjectHandle {
        self.alloc_with_kind(Some(self.intrinsics.date_prototype), ObjectKind::Date(time))
    }

    /// Allocate a bare function object with the given source text.  It has
    /// no own `name`/`length`/`prototype`; those belong to whoever creates it.
    pub fn alloc_function(&mut self, source: impl Into<String>) -> ObjectHandle {
        self.alloc_with_kind(
            Some(self.intrinsics.function_prototype),
            ObjectKind::Function(FunctionData {
                source: source.into(),
                native: false,
            }),
        )
    }

    /// Allocate a built-in function rendered as `[native code]`.
    pub fn alloc_native_function(&mut self, name: &str) -> ObjectHandle {
        self.alloc_with_kind(
            Some(self.intrinsics.function_prototype),
            ObjectKind::Function(FunctionData {
                source: native_source(name),
                native: true,
            }),
        )
    }

    /// Allocate a host tree node.
    pub fn alloc_host_node(
        &mut self,
        data: HostNodeData,
        proto: Option<ObjectHandle>,
    ) -> ObjectHandle {
        self.alloc_with_kind(proto, ObjectKind::HostNode(data))
    }

    /// Allocate a Proxy object.
    pub fn alloc_proxy(&mut self, target: ObjectHandle, handler: ObjectHandle) -> ObjectHandle {
        self.push_managed(ManagedObject::Proxy(ProxyObject::new(target, handler)))
    }

    /// Allocate a new unique symbol id.
    pub fn alloc_symbol(&mut self) -> SymbolId {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        id
    }

    // -- Lookup -------------------------------------------------------------

    /// Get a reference to a managed object.
    pub fn get(&self, handle: ObjectHandle) -> Result<&ManagedObject, ObjectError> {
        self.objects
            .get(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    /// Get a mutable reference to a managed object.
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut ManagedObject, ObjectError> {
        self.objects
            .get_mut(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        (handle.0 as usize) < self.objects.len()
    }

    /// Number of objects allocated.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Is the heap empty?
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The ordinary object behind `handle`; proxies are a `TypeError` because
    /// answering would require running the `trap` handler.
    pub fn ordinary(&self, handle: ObjectHandle, trap: &str) -> Result<&OrdinaryObject, ObjectError> {
        match self.get(handle)? {
            ManagedObject::Ordinary(o) => Ok(o),
            ManagedObject::Proxy(_) => Err(proxy_trap_error(trap)),
        }
    }

    fn ordinary_mut(
        &mut self,
        handle: ObjectHandle,
        trap: &str,
    ) -> Result<&mut OrdinaryObject, ObjectError> {
        match self.get_mut(handle)? {
            ManagedObject::Ordinary(o) => Ok(o),
            ManagedObject::Proxy(_) => Err(proxy_trap_error(trap)),
        }
    }

    /// Object kind, for ordinary objects.
    pub fn kind(&self, handle: ObjectHandle) -> Result<&ObjectKind, ObjectError> {
        Ok(&self.ordinary(handle, "kind")?.kind)
    }

    /// `IsCallable`: functions, and proxies whose target is callable.  Reads
    /// only internal slots, never traps.
    pub fn is_callable(&self, handle: ObjectHandle) -> bool {
        let mut current = handle;
        for _ in 0..=MAX_PROTOTYPE_CHAIN_DEPTH {
            match self.get(current) {
                Ok(ManagedObject::Ordinary(o)) => {
                    return matches!(o.kind, ObjectKind::Function(_));
                }
                Ok(ManagedObject::Proxy(p)) => match p.target {
                    Some(target) => current = target,
                    None => return false,
                },
                Err(_) => return false,
            }
        }
        false
    }

    // -- High-level operations requiring heap access ------------------------

    /// Find `key` on `handle` or its prototype chain, returning the holder and
    /// its own descriptor.
    pub fn find_property(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<Option<(ObjectHandle, &PropertyDescriptor)>, ObjectError> {
        let mut current = Some(handle);
        let mut depth: u32 = 0;
        let mut visited = BTreeSet::new();

        while let Some(h) = current {
            if depth > MAX_PROTOTYPE_CHAIN_DEPTH {
                return Err(ObjectError::PrototypeChainTooDeep {
                    depth,
                    max: MAX_PROTOTYPE_CHAIN_DEPTH,
                });
            }
            if !visited.insert(h) {
                return Err(ObjectError::PrototypeCycleDetected);
            }

            let o = self.ordinary(h, "get")?;
            if let Some(desc) = o.get_own_property(key) {
                return Ok(Some((h, desc)));
            }
            current = o.prototype;
            depth += 1;
        }
        Ok(None)
    }

    /// `[[Get]](O, P)`: get a property, walking the prototype chain.
    ///
    /// Accessors yield the getter handle as a marker; getter invocation is the
    /// interpreter's job.
    pub fn get_property(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<JsValue, ObjectError> {
        Ok(match self.find_property(handle, key)? {
            Some((_, PropertyDescriptor::Data { value, .. })) => value.clone(),
            Some((_, PropertyDescriptor::Accessor { get: Some(g), .. })) => JsValue::Object(*g),
            Some((_, PropertyDescriptor::Accessor { get: None, .. })) | None => JsValue::Undefined,
        })
    }

    /// `[[Set]](O, P, V)` on own properties.
    pub fn set_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        value: JsValue,
    ) -> Result<bool, ObjectError> {
        self.ordinary_mut(handle, "set")?.set(key, value)
    }

    /// `[[Delete]](O, P)`: delete a property.
    pub fn delete_property(
        &mut self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<bool, ObjectError> {
        Ok(self.ordinary_mut(handle, "deleteProperty")?.delete(key))
    }

    /// `Object.getPrototypeOf(O)`.
    pub fn get_prototype_of(
        &self,
        handle: ObjectHandle,
    ) -> Result<Option<ObjectHandle>, ObjectError> {
        Ok(self.ordinary(handle, "getPrototypeOf")?.prototype)
    }

    /// `Object.setPrototypeOf(O, proto)`.
    pub fn set_prototype_of(
        &mut self,
        handle: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> Result<bool, ObjectError> {
        // Check for cycles.
        if let Some(p) = proto {
            let mut current = Some(p);
            let mut visited = BTreeSet::new();
            visited.insert(handle);
            while let Some(h) = current {
                if !visited.insert(h) {
                    return Err(ObjectError::PrototypeCycleDetected);
                }
                match self.get(h)? {
                    ManagedObject::Ordinary(o) => current = o.prototype,
                    ManagedObject::Proxy(_) => break,
                }
            }
        }

        let o = self.ordinary_mut(handle, "setPrototypeOf")?;
        if !o.extensible {
            // Non-extensible: can only set prototype to current value.
            return Ok(o.prototype == proto);
        }
        o.prototype = proto;
        Ok(true)
    }

    /// `Object.isExtensible(O)`.
    pub fn is_extensible(&self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        Ok(self.ordinary(handle, "isExtensible")?.extensible)
    }

    /// `Object.preventExtensions(O)`.
    pub fn prevent_extensions(&mut self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        self.ordinary_mut(handle, "preventExtensions")?
            .prevent_extensions();
        Ok(true)
    }

    /// `Object.defineProperty(O, P, Desc)` with a complete descriptor.
    pub fn define_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        self.ordinary_mut(handle, "defineProperty")?
            .define_own_property(key, desc)
    }

    /// `Object.defineProperty(O, P, Desc)` with a partial descriptor: absent
    /// attributes keep the current own descriptor's, or default to
    /// `false`/`undefined` for a new property.
    pub fn define_property_partial(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        partial: PartialDescriptor,
    ) -> Result<bool, ObjectError> {
        let o = self.ordinary_mut(handle, "defineProperty")?;
        let desc = partial.complete_over(o.get_own_property(&key));
        o.define_own_property(key, desc)
    }

    /// `Object.getOwnPropertyDescriptor(O, P)`.
    pub fn get_own_property_descriptor(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ObjectError> {
        Ok(self
            .ordinary(handle, "getOwnPropertyDescriptor")?
            .get_own_property(key)
            .cloned())
    }

    /// `Object.getOwnPropertyDescriptors(O)`: all own property descriptors.
    pub fn get_own_property_descriptors(
        &self,
        handle: ObjectHandle,
    ) -> Result<Vec<(PropertyKey, PropertyDescriptor)>, ObjectError> {
        let o = self.ordinary(handle, "getOwnPropertyDescriptor")?;
        Ok(o.own_property_keys()
            .into_iter()
            .filter_map(|k| o.properties.get(&k).map(|d| (k, d.clone())))
            .collect())
    }

    /// `Reflect.ownKeys(O)`: every own key, including non-enumerable and
    /// symbol keys.
    pub fn own_keys(&self, handle: ObjectHandle) -> Result<Vec<PropertyKey>, ObjectError> {
        Ok(self.ordinary(handle, "ownKeys")?.own_property_keys())
    }

    /// `Object.freeze(O)`.
    pub fn freeze(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        self.ordinary_mut(handle, "freeze")?.freeze();
        Ok(())
    }

    /// `Object.isFrozen(O)`.
    pub fn is_frozen(&self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        match self.get(handle)? {
            ManagedObject::Ordinary(o) => Ok(o.is_frozen()),
            ManagedObject::Proxy(_) => Ok(false),
        }
    }

    /// Revoke a proxy object.
    pub fn revoke_proxy(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        match self.get_mut(handle)? {
            ManagedObject::Proxy(p) => {
                p.revoke();
                Ok(())
            }
            ManagedObject::Ordinary(_) => Err(ObjectError::TypeError(
                "cannot revoke non-proxy object".to_string(),
            )),
        }
    }
}

fn proxy_trap_error(trap: &str) -> ObjectError {
    ObjectError::TypeError(format!(
        "proxy {trap} trap must be handled by interpreter"
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
