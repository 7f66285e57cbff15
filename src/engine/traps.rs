//! Interception Handlers
//!
//! Every operation performed on a wrapper lands in one of the traps below.
//! Each trap first offers the operation to the [`TrapHandler`] of a
//! handler-mode engine. If the handler does not take it, the observed traps
//! (get, set, deleteProperty, apply, construct) trace a path, emit an
//! [`EventRecord`] and apply the result policy; the reflective traps fall
//! through to the heap without emitting anything.
//!
//! # Result policy
//!
//! With default action on, the real operation always runs and the callback's
//! reply is discarded. With it off, a [`Reply::Value`] becomes the result and
//! [`Reply::Canceled`] falls back to the real operation.

use super::Engine;
use crate::error::EngineError;
use crate::events::{EventKind, EventRecord, Reply};
use crate::heap::{Heap, ObjectId, PropertyDescriptor, PropertyKey, ProxyId, Value};
use crate::settings::RawSettings;
use std::fmt;
use tracing::{debug, trace};

/// The closed set of operations a wrapper intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trap {
    Get,
    Set,
    DeleteProperty,
    Apply,
    Construct,
    Has,
    OwnKeys,
    GetOwnPropertyDescriptor,
    DefineProperty,
    GetPrototypeOf,
    SetPrototypeOf,
    IsExtensible,
    PreventExtensions,
}

impl Trap {
    pub const ALL: [Trap; 13] = [
        Trap::Get,
        Trap::Set,
        Trap::DeleteProperty,
        Trap::Apply,
        Trap::Construct,
        Trap::Has,
        Trap::OwnKeys,
        Trap::GetOwnPropertyDescriptor,
        Trap::DefineProperty,
        Trap::GetPrototypeOf,
        Trap::SetPrototypeOf,
        Trap::IsExtensible,
        Trap::PreventExtensions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Trap::Get => "get",
            Trap::Set => "set",
            Trap::DeleteProperty => "deleteProperty",
            Trap::Apply => "apply",
            Trap::Construct => "construct",
            Trap::Has => "has",
            Trap::OwnKeys => "ownKeys",
            Trap::GetOwnPropertyDescriptor => "getOwnPropertyDescriptor",
            Trap::DefineProperty => "defineProperty",
            Trap::GetPrototypeOf => "getPrototypeOf",
            Trap::SetPrototypeOf => "setPrototypeOf",
            Trap::IsExtensible => "isExtensible",
            Trap::PreventExtensions => "preventExtensions",
        }
    }

    /// Whether the trap emits events when nothing overrides it.
    pub fn is_observed(self) -> bool {
        matches!(
            self,
            Trap::Get | Trap::Set | Trap::DeleteProperty | Trap::Apply | Trap::Construct
        )
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-trap overrides for a handler-mode engine.
///
/// Return `Some(result)` to take over the operation entirely; no event is
/// emitted and nothing else runs. Return `None` to let the engine handle it
/// with the flags from [`settings`](TrapHandler::settings).
///
/// Handlers receive the engine, so an override can still fall back to the
/// heap or perform intercepted operations of its own.
#[allow(unused_variables)]
pub trait TrapHandler {
    /// Flags for the traps this handler leaves to the engine. Taken as they
    /// are: an absent `default_action` means false.
    fn settings(&self) -> RawSettings {
        RawSettings::default()
    }

    fn get(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        key: &PropertyKey,
        receiver: ProxyId,
    ) -> Option<Result<Value, EngineError>> {
        None
    }

    fn set(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        key: &PropertyKey,
        value: &Value,
        receiver: ProxyId,
    ) -> Option<Result<bool, EngineError>> {
        None
    }

    fn delete_property(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        key: &PropertyKey,
    ) -> Option<Result<bool, EngineError>> {
        None
    }

    fn apply(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        this: &Value,
        args: &[Value],
    ) -> Option<Result<Value, EngineError>> {
        None
    }

    fn construct(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        args: &[Value],
        new_target: ProxyId,
    ) -> Option<Result<Value, EngineError>> {
        None
    }

    fn has(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        key: &PropertyKey,
    ) -> Option<Result<bool, EngineError>> {
        None
    }

    fn own_keys(
        &self,
        engine: &mut Engine,
        target: ObjectId,
    ) -> Option<Result<Vec<PropertyKey>, EngineError>> {
        None
    }

    fn get_own_property_descriptor(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        key: &PropertyKey,
    ) -> Option<Result<Option<PropertyDescriptor>, EngineError>> {
        None
    }

    fn define_property(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        key: &PropertyKey,
        descriptor: &PropertyDescriptor,
    ) -> Option<Result<bool, EngineError>> {
        None
    }

    fn get_prototype_of(
        &self,
        engine: &mut Engine,
        target: ObjectId,
    ) -> Option<Result<Option<ObjectId>, EngineError>> {
        None
    }

    fn set_prototype_of(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        prototype: Option<ObjectId>,
    ) -> Option<Result<bool, EngineError>> {
        None
    }

    fn is_extensible(&self, engine: &mut Engine, target: ObjectId) -> Option<Result<bool, EngineError>> {
        None
    }

    fn prevent_extensions(
        &self,
        engine: &mut Engine,
        target: ObjectId,
    ) -> Option<Result<bool, EngineError>> {
        None
    }
}

// ============================================================================
// Observed traps
// ============================================================================

impl Engine {
    pub(crate) fn get_trap(&mut self, proxy: ProxyId, key: PropertyKey) -> Result<Value, EngineError> {
        let target = self.nodes.target(proxy)?;
        trace!(trap = %Trap::Get, %proxy, %target, %key, "intercepted");
        if let Some(handler) = self.handler.clone() {
            if let Some(result) = handler.get(self, target, &key, proxy) {
                return result;
            }
        }

        self.materialize(proxy, &key)?;
        let path = self.trace_path(Some(proxy), Some(&key))?;
        let record = EventRecord::new(EventKind::Get, target, proxy, path).with_key(key.clone());
        match self.emit(record) {
            Reply::Value(value) if !self.settings.default_action => Ok(value),
            _ => self.heap.get(target, &key),
        }
    }

    pub(crate) fn set_trap(
        &mut self,
        proxy: ProxyId,
        key: PropertyKey,
        value: Value,
    ) -> Result<bool, EngineError> {
        let target = self.nodes.target(proxy)?;
        trace!(trap = %Trap::Set, %proxy, %target, %key, "intercepted");
        if let Some(handler) = self.handler.clone() {
            if let Some(result) = handler.set(self, target, &key, &value, proxy) {
                return result;
            }
        }

        let path = self.trace_path(Some(proxy), Some(&key))?;
        let record = EventRecord::new(EventKind::Set, target, proxy, path)
            .with_key(key.clone())
            .with_value(value.clone());
        match self.emit(record) {
            Reply::Value(allow) if !self.settings.default_action => Ok(allow.is_truthy()),
            _ => self.store(proxy, key, value),
        }
    }

    pub(crate) fn delete_trap(&mut self, proxy: ProxyId, key: PropertyKey) -> Result<bool, EngineError> {
        let target = self.nodes.target(proxy)?;
        trace!(trap = %Trap::DeleteProperty, %proxy, %target, %key, "intercepted");
        if let Some(handler) = self.handler.clone() {
            if let Some(result) = handler.delete_property(self, target, &key) {
                return result;
            }
        }

        let path = self.trace_path(Some(proxy), Some(&key))?;
        let record = EventRecord::new(EventKind::Delete, target, proxy, path).with_key(key.clone());
        let deleted = match self.emit(record) {
            Reply::Value(allow) if !self.settings.default_action => allow.is_truthy(),
            _ => self.heap.has(target, &key)? && self.heap.delete(target, &key)?,
        };
        if deleted {
            self.nodes.unmark(proxy, &key)?;
        }
        Ok(deleted)
    }

    pub(crate) fn apply_trap(
        &mut self,
        proxy: ProxyId,
        this: Value,
        args: Vec<Value>,
    ) -> Result<Value, EngineError> {
        let target = self.nodes.target(proxy)?;
        trace!(trap = %Trap::Apply, %proxy, %target, args = args.len(), "intercepted");
        if let Some(handler) = self.handler.clone() {
            if let Some(result) = handler.apply(self, target, &this, &args) {
                return result;
            }
        }

        let (real, nested) = if self.settings.default_action {
            let buffering = self.settings.contain_function_events;
            if buffering {
                self.calls.push();
                debug!(depth = self.calls.depth(), %proxy, "call buffer pushed");
            }
            // The buffer has to come off even when the body fails.
            let outcome = self.invoke_native(target, this.clone(), args.clone(), None);
            let nested = if buffering {
                let nested = self.calls.pop();
                debug!(depth = self.calls.depth(), events = nested.len(), "call buffer popped");
                nested
            } else {
                Vec::new()
            };
            (Some(outcome?), nested)
        } else {
            (None, Vec::new())
        };

        let node = self.nodes.get(proxy)?;
        let (parent, name) = (node.parent(), node.parent_key().cloned());
        let path = self.trace_path(parent, name.as_ref())?;
        let record = EventRecord::new(EventKind::FunctionCall, target, proxy, path)
            .with_name(name)
            .with_this(this.clone())
            .with_args(args.clone())
            .with_nested(nested);
        let reply = self.emit(record);

        match (real, reply) {
            (Some(result), _) => Ok(result),
            (None, Reply::Value(result)) => Ok(result),
            (None, Reply::Canceled) => self.invoke_native(target, this, args, None),
        }
    }

    pub(crate) fn construct_trap(&mut self, proxy: ProxyId, args: Vec<Value>) -> Result<Value, EngineError> {
        let target = self.nodes.target(proxy)?;
        trace!(trap = %Trap::Construct, %proxy, %target, args = args.len(), "intercepted");
        if let Some(handler) = self.handler.clone() {
            if let Some(result) = handler.construct(self, target, &args, proxy) {
                return result;
            }
        }

        let node = self.nodes.get(proxy)?;
        let (parent, name) = (node.parent(), node.parent_key().cloned());
        let path = self.trace_path(parent, name.as_ref())?;
        let record = EventRecord::new(EventKind::ConstructorCall, target, proxy, path)
            .with_name(name)
            .with_args(args.clone());
        match self.emit(record) {
            Reply::Value(result) if !self.settings.default_action => Ok(result),
            _ => self.construct_native(target, args),
        }
    }

    /// Hand `record` to the innermost buffering call, or dispatch it when no
    /// call is buffering. Buffered events read as [`Reply::Canceled`].
    fn emit(&mut self, record: EventRecord) -> Reply {
        let kind = record.kind;
        match self.calls.record(record) {
            Ok(()) => {
                debug!(%kind, depth = self.calls.depth(), "event buffered");
                Reply::Canceled
            }
            Err(record) => self.registry.dispatch(kind, &record),
        }
    }
}

// ============================================================================
// Reflective traps
// ============================================================================

impl Engine {
    /// Run a reflective operation on `object`: through the handler override
    /// when the value is a wrapper and one is present, otherwise on the heap.
    pub(crate) fn reflect<T>(
        &mut self,
        object: &Value,
        trap: Trap,
        override_with: impl FnOnce(&dyn TrapHandler, &mut Engine, ObjectId) -> Option<Result<T, EngineError>>,
        default: impl FnOnce(&mut Heap, ObjectId) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let target = match object {
            Value::Proxy(proxy) => {
                let target = self.nodes.target(*proxy)?;
                trace!(%trap, %proxy, %target, "intercepted");
                if let Some(handler) = self.handler.clone() {
                    if let Some(result) = override_with(handler.as_ref(), self, target) {
                        return result;
                    }
                }
                target
            }
            Value::Object(id) => *id,
            other => return Err(EngineError::NotAnObject(other.to_string())),
        };
        default(&mut self.heap, target)
    }
}
