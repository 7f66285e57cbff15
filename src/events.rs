//! Event Dispatcher & Registry
//!
//! Observable operations produce an [`EventRecord`]. At most one callback is
//! registered per [`EventKind`]; dispatching an event with no callback yields
//! [`Reply::Canceled`].
//!
//! While a call is buffering its side effects, records go onto the
//! [`CallEventStack`] instead of reaching a callback. The call's own record
//! carries them in `nested`.

use crate::error::EngineError;
use crate::heap::{ObjectId, PropertyKey, ProxyId, Value};
use crate::path::TracedPath;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Delete,
    Get,
    Set,
    FunctionCall,
    ConstructorCall,
    /// The "nothing handled this" sentinel. Never observable.
    Canceled,
}

impl EventKind {
    /// The five kinds callbacks can be registered for.
    pub const OBSERVABLE: [EventKind; 5] = [
        EventKind::Delete,
        EventKind::Get,
        EventKind::Set,
        EventKind::FunctionCall,
        EventKind::ConstructorCall,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Delete => "DELETE",
            EventKind::Get => "GET",
            EventKind::Set => "SET",
            EventKind::FunctionCall => "FUNCTION_CALL",
            EventKind::ConstructorCall => "CONSTRUCTOR_CALL",
            EventKind::Canceled => "CANCELED",
        }
    }

    pub fn is_observable(self) -> bool {
        self != EventKind::Canceled
    }

    fn observable(self) -> Result<Self, EngineError> {
        if self.is_observable() {
            Ok(self)
        } else {
            Err(EngineError::InvalidEvent(self.name().to_string()))
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = EngineError;

    /// Case-insensitive; `-` may stand in for `_`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let normalized = name.trim().to_ascii_uppercase().replace('-', "_");
        [EventKind::Canceled]
            .into_iter()
            .chain(EventKind::OBSERVABLE)
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| EngineError::InvalidEvent(name.to_string()))
    }
}

/// One intercepted operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub kind: EventKind,
    /// The raw object the operation applies to.
    pub target: ObjectId,
    /// The wrapper the operation went through.
    pub proxy: ProxyId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PropertyKey>,
    /// Value being written (SET), before it is wrapped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Key the called function hangs off its parent under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<PropertyKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub this: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    pub path: TracedPath,
    /// Operations performed while the call was running.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<EventRecord>,
}

impl EventRecord {
    pub(crate) fn new(kind: EventKind, target: ObjectId, proxy: ProxyId, path: TracedPath) -> Self {
        Self {
            kind,
            target,
            proxy,
            key: None,
            value: None,
            name: None,
            this: None,
            args: None,
            path,
            nested: Vec::new(),
        }
    }

    pub(crate) fn with_key(mut self, key: PropertyKey) -> Self {
        self.key = Some(key);
        self
    }

    pub(crate) fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub(crate) fn with_name(mut self, name: Option<PropertyKey>) -> Self {
        self.name = name;
        self
    }

    pub(crate) fn with_this(mut self, this: Value) -> Self {
        self.this = Some(this);
        self
    }

    pub(crate) fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = Some(args);
        self
    }

    pub(crate) fn with_nested(mut self, nested: Vec<EventRecord>) -> Self {
        self.nested = nested;
        self
    }
}

/// What a callback wants done with the operation.
///
/// With default action enabled the reply is ignored and the real operation
/// always runs. Without it, `Value` becomes the operation's result (for SET
/// and DELETE, its truthiness) and `Canceled` falls back to the real operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reply {
    #[default]
    Canceled,
    Value(Value),
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

impl From<bool> for Reply {
    fn from(allow: bool) -> Self {
        Reply::Value(Value::Bool(allow))
    }
}

/// A registered event callback.
pub type Callback = Rc<dyn Fn(&EventRecord) -> Reply>;

/// Wrap a closure as a registrable callback.
pub fn callback<F>(f: F) -> Option<Callback>
where
    F: Fn(&EventRecord) -> Reply + 'static,
{
    Some(Rc::new(f))
}

/// One callback per observable event kind.
#[derive(Default, Clone)]
pub struct Registry {
    callbacks: HashMap<EventKind, Callback>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `kind`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// `InvalidEvent` for a non-observable kind, `InvalidCallback` when no
    /// callback is given. The registry is unchanged on error.
    pub fn on(&mut self, kind: EventKind, callback: Option<Callback>) -> Result<(), EngineError> {
        let kind = kind.observable()?;
        let callback = callback.ok_or(EngineError::InvalidCallback(kind))?;
        self.callbacks.insert(kind, callback);
        Ok(())
    }

    /// Unregister the callback for `kind`; a no-op when none is registered.
    pub fn remove(&mut self, kind: EventKind) -> Result<(), EngineError> {
        let kind = kind.observable()?;
        self.callbacks.remove(&kind);
        Ok(())
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    /// Invoke the callback for `kind` with `record` and return its reply
    /// verbatim, or `Canceled` when nothing is registered.
    pub fn dispatch(&self, kind: EventKind, record: &EventRecord) -> Reply {
        if !kind.is_observable() {
            return Reply::Canceled;
        }
        match self.callbacks.get(&kind) {
            Some(callback) => callback(record),
            None => Reply::Canceled,
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.callbacks.keys().map(|k| k.name()).collect();
        kinds.sort_unstable();
        f.debug_struct("Registry").field("callbacks", &kinds).finish()
    }
}

/// Buffers of in-flight calls, innermost last.
#[derive(Debug, Default)]
pub struct CallEventStack {
    frames: Vec<Vec<EventRecord>>,
}

impl CallEventStack {
    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Remove the innermost buffer and return what it collected.
    pub fn pop(&mut self) -> Vec<EventRecord> {
        self.frames.pop().unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append to the innermost buffer. Hands the record back when no call
    /// is buffering.
    pub fn record(&mut self, record: EventRecord) -> Result<(), EventRecord> {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.push(record);
                Ok(())
            }
            None => Err(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::trace;
    use std::cell::Cell;

    fn record(kind: EventKind) -> EventRecord {
        EventRecord::new(kind, ObjectId(0), ProxyId(0), trace(&[], None))
    }

    #[test]
    fn parses_event_names() {
        assert_eq!("GET".parse::<EventKind>().unwrap(), EventKind::Get);
        assert_eq!(
            "function-call".parse::<EventKind>().unwrap(),
            EventKind::FunctionCall
        );
        assert_eq!(
            "CANCELED".parse::<EventKind>().unwrap(),
            EventKind::Canceled
        );
        assert_eq!(
            "UPDATE".parse::<EventKind>(),
            Err(EngineError::InvalidEvent("UPDATE".to_string()))
        );
    }

    #[test]
    fn dispatch_without_callback_is_canceled() {
        let registry = Registry::new();
        assert_eq!(
            registry.dispatch(EventKind::Get, &record(EventKind::Get)),
            Reply::Canceled
        );
    }

    #[test]
    fn dispatch_returns_reply_verbatim() {
        let mut registry = Registry::new();
        registry
            .on(EventKind::Get, callback(|_| Reply::Value(Value::from("x"))))
            .unwrap();
        assert_eq!(
            registry.dispatch(EventKind::Get, &record(EventKind::Get)),
            Reply::Value(Value::from("x"))
        );
        assert_eq!(
            registry.dispatch(EventKind::Canceled, &record(EventKind::Canceled)),
            Reply::Canceled
        );
    }

    #[test]
    fn registration_overwrites() {
        let calls = Rc::new(Cell::new(0));
        let mut registry = Registry::new();
        registry.on(EventKind::Set, callback(|_| Reply::from(false))).unwrap();
        let seen = calls.clone();
        registry
            .on(
                EventKind::Set,
                callback(move |_| {
                    seen.set(seen.get() + 1);
                    Reply::Canceled
                }),
            )
            .unwrap();

        assert_eq!(
            registry.dispatch(EventKind::Set, &record(EventKind::Set)),
            Reply::Canceled
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn invalid_registration_leaves_registry_unchanged() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.on(EventKind::Canceled, callback(|_| Reply::Canceled)),
            Err(EngineError::InvalidEvent("CANCELED".to_string()))
        );
        assert_eq!(
            registry.on(EventKind::Delete, None),
            Err(EngineError::InvalidCallback(EventKind::Delete))
        );
        assert!(!registry.is_registered(EventKind::Delete));
        assert!(!registry.is_registered(EventKind::Canceled));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = Registry::new();
        registry.on(EventKind::Get, callback(|_| Reply::Canceled)).unwrap();
        registry.remove(EventKind::Get).unwrap();
        registry.remove(EventKind::Get).unwrap();
        assert!(!registry.is_registered(EventKind::Get));
        assert!(registry.remove(EventKind::Canceled).is_err());
    }

    #[test]
    fn call_stack_buffers_innermost() {
        let mut stack = CallEventStack::default();
        assert!(stack.record(record(EventKind::Get)).is_err());

        stack.push();
        stack.record(record(EventKind::Get)).unwrap();
        stack.push();
        stack.record(record(EventKind::Set)).unwrap();

        let inner = stack.pop();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].kind, EventKind::Set);
        let outer = stack.pop();
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].kind, EventKind::Get);
        assert!(stack.is_empty());
    }
}
