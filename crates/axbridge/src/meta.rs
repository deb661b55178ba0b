//! Generated metadata: the reflection surface of a wrapped object
//!
//! A [`MetaObject`] lists the slots (callable methods, including synthesized
//! setters and optional-parameter overloads), signals, properties, enums and
//! class information read from an object's type library. It is immutable once
//! built and shared between every wrapper of the same class through
//! [`crate::MetaObjectCache`].

use std::collections::BTreeMap;

use axcom::{DISPID, GUID};
use bitflags::bitflags;

bitflags! {
    /// Capabilities of a [`MetaProperty`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u32 {
        const READABLE = 0x0001;
        const WRITABLE = 0x0002;
        /// Visible at design time (not hidden or non-browsable)
        const DESIGNABLE = 0x0004;
        /// Not restricted
        const SCRIPTABLE = 0x0008;
        const STORED = 0x0010;
        /// Notifies changes through `IPropertyNotifySink`
        const BINDABLE = 0x0020;
        /// Asks `IPropertyNotifySink::OnRequestEdit` before changing
        const REQUESTING_EDIT = 0x0040;
        /// The type is one of the object's enums
        const ENUM_OR_FLAG = 0x0080;
    }
}

/// Slot or signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Slot,
    Signal,
}

/// How a slot reaches the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Method,
    PropertyGet,
    PropertyPut,
    PropertyPutRef,
}

/// One slot or signal
#[derive(Debug, Clone, PartialEq)]
pub struct MetaMethod {
    /// Normalized signature, e.g. `Add(int,int)`
    pub signature: String,
    /// Empty for no return value
    pub return_type: String,
    /// Declared parameter types, e.g. `short` or `int&`
    pub parameter_types: Vec<String>,
    pub parameter_names: Vec<String>,
    pub kind: MethodKind,
    pub invoke: InvokeKind,
    /// An overload synthesized by dropping trailing optional parameters
    pub cloned: bool,
}

impl MetaMethod {
    /// The member name: the signature up to the parenthesis
    #[must_use]
    pub fn name(&self) -> &str {
        self.signature
            .split_once('(')
            .map_or(self.signature.as_str(), |(name, _)| name)
    }

    /// Whether parameter `i` is passed by reference
    #[must_use]
    pub fn is_output(&self, i: usize) -> bool {
        self.parameter_types.get(i).is_some_and(|t| is_reference(t))
    }
}

/// One property
#[derive(Debug, Clone, PartialEq)]
pub struct MetaProperty {
    pub name: String,
    pub type_name: String,
    pub flags: PropertyFlags,
    /// Change signal of a bindable property
    pub notify: Option<String>,
}

impl MetaProperty {
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.flags.contains(PropertyFlags::READABLE)
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.flags.contains(PropertyFlags::WRITABLE)
    }
}

/// One enum with its keys in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEnum {
    pub name: String,
    pub keys: Vec<(String, i32)>,
}

impl MetaEnum {
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<i32> {
        self.keys.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    #[must_use]
    pub fn key_of(&self, value: i32) -> Option<&str> {
        self.keys
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(k, _)| k.as_str())
    }
}

/// What an event sink advised on one outgoing interface reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub iid: GUID,
    /// Event DISPID to signal signature
    pub signals: BTreeMap<DISPID, String>,
    /// Bindable property DISPID to property name
    pub props: BTreeMap<DISPID, String>,
    /// Bindable property DISPID to its change signal
    pub prop_signals: BTreeMap<DISPID, String>,
}

impl ConnectionInfo {
    #[must_use]
    pub fn new(iid: GUID) -> Self {
        Self {
            iid,
            signals: BTreeMap::new(),
            props: BTreeMap::new(),
            prop_signals: BTreeMap::new(),
        }
    }
}

/// Generic signal carrying every event undecoded: name, argument count, arguments
pub const GENERIC_SIGNAL: &str = "signal(string,int,void*)";
/// Server exception: code, source, description, help
pub const EXCEPTION_SIGNAL: &str = "exception(int,string,string,string)";
/// Any bindable property changed; carries the property name
pub const PROPERTY_CHANGED_SIGNAL: &str = "propertyChanged(string)";
/// Property holding the control identifier
pub const CONTROL_PROPERTY: &str = "control";

/// Reflection data of one automation class
#[derive(Debug, Clone, PartialEq)]
pub struct MetaObject {
    pub class_name: String,
    pub class_info: Vec<(String, String)>,
    pub methods: Vec<MetaMethod>,
    pub properties: Vec<MetaProperty>,
    pub enums: Vec<MetaEnum>,
    /// Outgoing interfaces to advise on, one event sink each
    pub connections: Vec<ConnectionInfo>,
}

impl MetaObject {
    /// Value of class information entry `key`
    #[must_use]
    pub fn class_info(&self, key: &str) -> Option<&str> {
        self.class_info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Slot or signal with `signature`, which is normalized first.
    #[must_use]
    pub fn method(&self, signature: &str) -> Option<&MetaMethod> {
        let signature = normalize_signature(signature);
        self.methods.iter().find(|m| m.signature == signature)
    }

    #[must_use]
    pub fn slot(&self, signature: &str) -> Option<&MetaMethod> {
        self.method(signature).filter(|m| m.kind == MethodKind::Slot)
    }

    #[must_use]
    pub fn signal(&self, signature: &str) -> Option<&MetaMethod> {
        self.method(signature).filter(|m| m.kind == MethodKind::Signal)
    }

    pub fn slots(&self) -> impl Iterator<Item = &MetaMethod> {
        self.methods.iter().filter(|m| m.kind == MethodKind::Slot)
    }

    pub fn signals(&self) -> impl Iterator<Item = &MetaMethod> {
        self.methods.iter().filter(|m| m.kind == MethodKind::Signal)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&MetaProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn enumerator(&self, name: &str) -> Option<&MetaEnum> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Value of enum key `key` in any of the object's enums
    #[must_use]
    pub fn enum_value(&self, key: &str) -> Option<i32> {
        self.enums.iter().find_map(|e| e.value_of(key))
    }

    #[must_use]
    pub fn connection(&self, iid: &GUID) -> Option<&ConnectionInfo> {
        self.connections.iter().find(|c| c.iid == *iid)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Accumulates members while a type library is walked.
///
/// Lookups are by normalized signature and property name; adding a member
/// that already exists merges instead of duplicating.
#[derive(Debug, Default)]
pub struct MetaBuilder {
    class_name: String,
    class_info: Vec<(String, String)>,
    methods: Vec<MetaMethod>,
    properties: Vec<MetaProperty>,
    enums: Vec<MetaEnum>,
    connections: Vec<ConnectionInfo>,
    /// Bindable property DISPID to (property, change signal)
    notifications: BTreeMap<DISPID, (String, String)>,
}

impl MetaBuilder {
    #[must_use]
    pub fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            ..Self::default()
        }
    }

    pub fn set_class_name(&mut self, class_name: &str) {
        self.class_name = class_name.to_string();
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn add_class_info(&mut self, key: &str, value: &str) {
        match self.class_info.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.class_info.push((key.to_string(), value.to_string())),
        }
    }

    #[must_use]
    pub fn has_class_info(&self, key: &str) -> bool {
        self.class_info.iter().any(|(k, _)| k == key)
    }

    pub fn add_enum(&mut self, meta_enum: MetaEnum) {
        if !self.has_enum(&meta_enum.name) {
            self.enums.push(meta_enum);
        }
    }

    #[must_use]
    pub fn has_enum(&self, name: &str) -> bool {
        !name.is_empty() && self.enums.iter().any(|e| e.name == name)
    }

    #[must_use]
    pub fn has_slot(&self, signature: &str) -> bool {
        self.find_method(signature, MethodKind::Slot).is_some()
    }

    #[must_use]
    pub fn has_signal(&self, signature: &str) -> bool {
        self.find_method(signature, MethodKind::Signal).is_some()
    }

    fn find_method(&self, signature: &str, kind: MethodKind) -> Option<&MetaMethod> {
        let signature = normalize_signature(signature);
        self.methods
            .iter()
            .find(|m| m.kind == kind && m.signature == signature)
    }

    /// Add a slot unless one with the same signature exists.
    pub fn add_slot(&mut self, method: MetaMethod) {
        let method = MetaMethod {
            signature: normalize_signature(&method.signature),
            kind: MethodKind::Slot,
            ..method
        };
        if !self.has_slot(&method.signature) {
            self.methods.push(method);
        }
    }

    /// Add a signal unless one with the same signature exists.
    pub fn add_signal(&mut self, signature: &str, parameter_types: Vec<String>, parameter_names: Vec<String>) {
        let signature = normalize_signature(signature);
        if self.has_signal(&signature) {
            return;
        }
        self.methods.push(MetaMethod {
            signature,
            return_type: String::new(),
            parameter_types,
            parameter_names,
            kind: MethodKind::Signal,
            invoke: InvokeKind::Method,
            cloned: false,
        });
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name == name)
    }

    #[must_use]
    pub fn property_type(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.type_name.as_str())
    }

    /// Add a property, or merge flags (and a missing type) into an existing one.
    pub fn add_property(&mut self, type_name: &str, name: &str, flags: PropertyFlags) {
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                if existing.type_name.is_empty() {
                    existing.type_name = type_name.to_string();
                }
                existing.flags |= flags;
            }
            None => self.properties.push(MetaProperty {
                name: name.to_string(),
                type_name: type_name.to_string(),
                flags,
                notify: None,
            }),
        }
    }

    /// `<name>Changed(<type>)`, bound to `memid` for property notifications.
    pub fn add_changed_signal(&mut self, name: &str, type_name: &str, memid: DISPID) {
        let signature = normalize_signature(&format!("{name}Changed({type_name})"));
        self.add_signal(&signature, vec![type_name.to_string()], vec![name.to_string()]);
        self.notifications
            .insert(memid, (name.to_string(), signature));
    }

    /// `set<Name>(<type>)` for a writable property.
    pub fn add_setter_slot(&mut self, property: &str) {
        let type_name = self.property_type(property).unwrap_or_default().to_string();
        let signature = format!("{}({})", setter_name(property), type_name);
        if self.has_slot(&signature) {
            return;
        }
        self.add_slot(MetaMethod {
            signature,
            return_type: String::new(),
            parameter_types: vec![type_name],
            parameter_names: vec![property.to_string()],
            kind: MethodKind::Slot,
            invoke: InvokeKind::PropertyPut,
            cloned: false,
        });
    }

    /// Register the sink connection for `iid`, merging with a previous one.
    pub fn connection_mut(&mut self, iid: GUID) -> &mut ConnectionInfo {
        let index = match self.connections.iter().position(|c| c.iid == iid) {
            Some(index) => index,
            None => {
                self.connections.push(ConnectionInfo::new(iid));
                self.connections.len() - 1
            }
        };
        &mut self.connections[index]
    }

    /// Bindable properties seen so far: DISPID to (property, change signal)
    #[must_use]
    pub fn notifications(&self) -> &BTreeMap<DISPID, (String, String)> {
        &self.notifications
    }

    /// The packed result.
    #[must_use]
    pub fn build(self) -> MetaObject {
        let mut properties = self.properties;
        for property in &mut properties {
            property.notify = self
                .notifications
                .values()
                .find(|(name, _)| *name == property.name)
                .map(|(_, signal)| signal.clone());
        }
        MetaObject {
            class_name: self.class_name,
            class_info: self.class_info,
            methods: self.methods,
            properties,
            enums: self.enums,
            connections: self.connections,
        }
    }
}

/// The type a by-reference parameter refers to: `int` for `int&`,
/// `IDispatch*` for `IDispatch**`, `font` for an out font (`font*`).
/// `None` for parameters passed by value.
#[must_use]
pub fn reference_target(type_name: &str) -> Option<&str> {
    let name = type_name.trim();
    if let Some(target) = name.strip_suffix('&') {
        return Some(target);
    }
    if name.ends_with("**") || matches!(name, "font*" | "pixmap*") {
        return name.strip_suffix('*');
    }
    None
}

#[must_use]
pub fn is_reference(type_name: &str) -> bool {
    reference_target(type_name).is_some()
}

/// `setFoo` for property `foo` or `Foo`.
#[must_use]
pub fn setter_name(property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("set{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "set".to_string(),
    }
}

// =============================================================================
// Signature normalization
// =============================================================================

/// Canonical spelling of a parameter type
fn normalize_type(type_name: &str) -> String {
    let compact: String = type_name.split_whitespace().collect::<Vec<_>>().join(" ");
    let (base, suffix) = match compact.find(['&', '*']) {
        Some(pos) => compact.split_at(pos),
        None => (compact.as_str(), ""),
    };
    let base = base.trim_end();
    let suffix: String = suffix.chars().filter(|c| !c.is_whitespace()).collect();
    let base = match base {
        "short" | "char" | "long" => "int",
        "ushort" | "uchar" | "ulong" => "uint",
        "float" => "double",
        "List<int>" | "List<uint>" | "List<double>" | "List<bool>" | "List<datetime>"
        | "List<int64>" => "list",
        other => other,
    };
    format!("{base}{suffix}")
}

/// Split `text` at commas that are not nested inside `<>`.
pub(crate) fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// `name(type,type)` with whitespace removed and integer/float variants
/// folded into `int`, `uint` and `double`. Reference markers are kept.
///
/// A signature without parentheses is returned trimmed.
#[must_use]
pub fn normalize_signature(signature: &str) -> String {
    let signature = signature.trim();
    let (Some(open), Some(close)) = (signature.find('('), signature.rfind(')')) else {
        return signature.to_string();
    };
    if close < open {
        return signature.to_string();
    }
    let name = signature[..open].trim();
    let inner = signature[open + 1..close].trim();
    if inner.is_empty() {
        return format!("{name}()");
    }
    let params: Vec<String> = split_top_level(inner)
        .into_iter()
        .map(normalize_type)
        .collect();
    format!("{name}({})", params.join(","))
}
