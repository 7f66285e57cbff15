//! Interception Engine
//!
//! An [`Engine`] owns a [`Heap`] and a root wrapper over one value in it.
//! Everything done to a wrapper goes through the engine's Reflect-style
//! entry points ([`get`](Engine::get), [`set`](Engine::set),
//! [`call`](Engine::call), ...), which route it into the traps:
//!
//! ```text
//! Engine::set(proxy, key, value)
//!     -> set trap
//!         -> TrapHandler override?           (handler mode)
//!         -> trace path, emit SET event
//!             -> call buffer or callback
//!         -> result policy, wrap + store
//! ```
//!
//! Raw objects passed to the entry points bypass interception and use the
//! heap directly, the same way operations on an unwrapped value would.

mod traps;
mod wrap;

pub use traps::{Trap, TrapHandler};
pub use wrap::WrapNode;

use crate::error::EngineError;
use crate::events::{CallEventStack, Callback, EventKind, Registry};
use crate::heap::{Heap, Invocation, ObjectId, ObjectKind, PropertyDescriptor, PropertyKey, ProxyId, Value};
use crate::path::{self, TracedPath};
use crate::settings::{RawSettings, Settings};
use std::fmt;
use std::rc::Rc;
use tracing::info;
use wrap::WrapArena;

const PROTOTYPE: &str = "prototype";

/// How an engine treats intercepted operations, fixed at construction.
#[derive(Clone)]
pub enum Mode {
    /// Full pipeline, with settings normalized by [`RawSettings::resolve`].
    Observe(RawSettings),
    /// Offer every operation to the handler first. Settings come from
    /// [`TrapHandler::settings`] and are not normalized.
    Handler(Rc<dyn TrapHandler>),
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Observe(RawSettings::default())
    }
}

impl From<RawSettings> for Mode {
    fn from(raw: RawSettings) -> Self {
        Mode::Observe(raw)
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Observe(raw) => f.debug_tuple("Observe").field(raw).finish(),
            Mode::Handler(handler) => f.debug_tuple("Handler").field(&handler.settings()).finish(),
        }
    }
}

/// A wrapped object graph and the callbacks observing it.
///
/// Wrapper nodes are never reclaimed. Rewriting a slot with the object it
/// already holds keeps the slot's wrapper, but every other object stored or
/// first read at a location allocates a node that lives as long as the
/// engine. Handles to replaced wrappers keep fronting their old objects.
pub struct Engine {
    heap: Heap,
    nodes: WrapArena,
    registry: Registry,
    settings: Settings,
    handler: Option<Rc<dyn TrapHandler>>,
    calls: CallEventStack,
    root: Value,
}

impl Engine {
    /// Wrap `source` in `heap`. Primitives are not wrapped and come back
    /// unchanged from [`proxy`](Engine::proxy).
    pub fn new(heap: Heap, source: Value, mode: impl Into<Mode>) -> Result<Self, EngineError> {
        let (settings, handler) = match mode.into() {
            Mode::Observe(raw) => (raw.resolve(), None),
            Mode::Handler(handler) => (Settings::unresolved(&handler.settings()), Some(handler)),
        };
        let mut engine = Self {
            heap,
            nodes: WrapArena::default(),
            registry: Registry::new(),
            settings,
            handler,
            calls: CallEventStack::default(),
            root: Value::Undefined,
        };
        engine.root = engine.wrap(source, None, None)?;
        info!(
            root = %engine.root,
            default_action = settings.default_action,
            contain_function_events = settings.contain_function_events,
            handler = engine.handler.is_some(),
            "engine ready"
        );
        Ok(engine)
    }

    /// Build the graph from a JSON document and wrap its root.
    pub fn from_json(document: &serde_json::Value, mode: impl Into<Mode>) -> Result<Self, EngineError> {
        let mut heap = Heap::new();
        let source = heap.import_json(document);
        Self::new(heap, source, mode)
    }

    /// The root wrapper.
    pub fn proxy(&self) -> Value {
        self.root.clone()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Direct heap access. Changes made here are not observed.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn node(&self, proxy: ProxyId) -> Result<&WrapNode, EngineError> {
        self.nodes.get(proxy)
    }

    /// Number of wrappers created so far, including replaced ones.
    pub fn wrapper_count(&self) -> usize {
        self.nodes.len()
    }

    /// The raw object behind a wrapper or object value.
    pub fn target_of(&self, value: &Value) -> Option<ObjectId> {
        match value {
            Value::Object(id) => Some(*id),
            Value::Proxy(proxy) => self.nodes.target(*proxy).ok(),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register `callback` for `kind`, replacing any previous one.
    ///
    /// ```
    /// use deepwatch::{callback, Engine, EventKind, RawSettings, Reply};
    /// use serde_json::json;
    ///
    /// let mut engine = Engine::from_json(&json!({"a": 1}), RawSettings::new()).unwrap();
    /// engine
    ///     .on(EventKind::Get, callback(|_| Reply::Canceled))
    ///     .unwrap()
    ///     .on(EventKind::Set, callback(|_| Reply::Canceled))
    ///     .unwrap();
    /// ```
    pub fn on(&mut self, kind: EventKind, callback: Option<Callback>) -> Result<&mut Self, EngineError> {
        self.registry.on(kind, callback)?;
        Ok(self)
    }

    pub fn remove(&mut self, kind: EventKind) -> Result<&mut Self, EngineError> {
        self.registry.remove(kind)?;
        Ok(self)
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.registry.is_registered(kind)
    }

    // ------------------------------------------------------------------------
    // Observed operations
    // ------------------------------------------------------------------------

    pub fn get(&mut self, object: &Value, key: impl Into<PropertyKey>) -> Result<Value, EngineError> {
        let key = key.into();
        match object {
            Value::Proxy(proxy) => self.get_trap(*proxy, key),
            Value::Object(id) => self.heap.get(*id, &key),
            other => Err(EngineError::NotAnObject(other.to_string())),
        }
    }

    pub fn set(
        &mut self,
        object: &Value,
        key: impl Into<PropertyKey>,
        value: impl Into<Value>,
    ) -> Result<bool, EngineError> {
        let (key, value) = (key.into(), value.into());
        match object {
            Value::Proxy(proxy) => self.set_trap(*proxy, key, value),
            Value::Object(id) => self.heap.set(*id, key, value),
            other => Err(EngineError::NotAnObject(other.to_string())),
        }
    }

    /// Delete `key`. Reports `false` when there is nothing to delete.
    pub fn delete(&mut self, object: &Value, key: impl Into<PropertyKey>) -> Result<bool, EngineError> {
        let key = key.into();
        match object {
            Value::Proxy(proxy) => self.delete_trap(*proxy, key),
            Value::Object(id) => self.heap.delete(*id, &key),
            other => Err(EngineError::NotAnObject(other.to_string())),
        }
    }

    /// Call `callee` with `this` as receiver.
    pub fn call(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> Result<Value, EngineError> {
        match callee {
            Value::Proxy(proxy) => {
                let target = self.nodes.target(*proxy)?;
                if !self.heap.object(target)?.is_callable() {
                    return Err(EngineError::NotCallable(callee.to_string()));
                }
                self.apply_trap(*proxy, this, args)
            }
            Value::Object(id) => self.invoke_native(*id, this, args, None),
            other => Err(EngineError::NotCallable(other.to_string())),
        }
    }

    /// Construct a new instance with `callee`.
    pub fn construct(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, EngineError> {
        match callee {
            Value::Proxy(proxy) => {
                let target = self.nodes.target(*proxy)?;
                if !self.heap.object(target)?.is_constructor() {
                    return Err(EngineError::NotConstructor(callee.to_string()));
                }
                self.construct_trap(*proxy, args)
            }
            Value::Object(id) => self.construct_native(*id, args),
            other => Err(EngineError::NotConstructor(other.to_string())),
        }
    }

    /// Read `key` from `receiver` and call it as a method of `receiver`.
    pub fn invoke(
        &mut self,
        receiver: &Value,
        key: impl Into<PropertyKey>,
        args: Vec<Value>,
    ) -> Result<Value, EngineError> {
        let method = self.get(receiver, key)?;
        self.call(&method, receiver.clone(), args)
    }

    /// Follow `segments` from `root` with successive reads.
    pub fn resolve_path<S: AsRef<str>>(&mut self, root: &Value, segments: &[S]) -> Result<Value, EngineError> {
        let mut current = root.clone();
        for segment in segments {
            current = self.get(&current, segment.as_ref())?;
        }
        Ok(current)
    }

    // ------------------------------------------------------------------------
    // Reflective operations
    // ------------------------------------------------------------------------

    pub fn has(&mut self, object: &Value, key: impl Into<PropertyKey>) -> Result<bool, EngineError> {
        let key = key.into();
        self.reflect(
            object,
            Trap::Has,
            |handler, engine, target| handler.has(engine, target, &key),
            |heap, target| heap.has(target, &key),
        )
    }

    pub fn own_keys(&mut self, object: &Value) -> Result<Vec<PropertyKey>, EngineError> {
        self.reflect(
            object,
            Trap::OwnKeys,
            |handler, engine, target| handler.own_keys(engine, target),
            |heap, target| heap.own_keys(target),
        )
    }

    pub fn get_own_property_descriptor(
        &mut self,
        object: &Value,
        key: impl Into<PropertyKey>,
    ) -> Result<Option<PropertyDescriptor>, EngineError> {
        let key = key.into();
        self.reflect(
            object,
            Trap::GetOwnPropertyDescriptor,
            |handler, engine, target| handler.get_own_property_descriptor(engine, target, &key),
            |heap, target| heap.get_own_property_descriptor(target, &key),
        )
    }

    pub fn define_property(
        &mut self,
        object: &Value,
        key: impl Into<PropertyKey>,
        descriptor: PropertyDescriptor,
    ) -> Result<bool, EngineError> {
        let key = key.into();
        self.reflect(
            object,
            Trap::DefineProperty,
            |handler, engine, target| handler.define_property(engine, target, &key, &descriptor),
            |heap, target| heap.define_property(target, key.clone(), descriptor.clone()),
        )
    }

    /// The prototype as a value: the raw prototype object, or `null`.
    pub fn get_prototype_of(&mut self, object: &Value) -> Result<Value, EngineError> {
        let prototype = self.reflect(
            object,
            Trap::GetPrototypeOf,
            |handler, engine, target| handler.get_prototype_of(engine, target),
            |heap, target| heap.get_prototype_of(target),
        )?;
        Ok(prototype.map_or(Value::Null, Value::Object))
    }

    /// Change the prototype. `prototype` is `null`, an object or a wrapper.
    pub fn set_prototype_of(&mut self, object: &Value, prototype: &Value) -> Result<bool, EngineError> {
        let prototype = match prototype {
            Value::Null => None,
            other => Some(
                self.target_of(other)
                    .ok_or_else(|| EngineError::NotAnObject(other.to_string()))?,
            ),
        };
        self.reflect(
            object,
            Trap::SetPrototypeOf,
            |handler, engine, target| handler.set_prototype_of(engine, target, prototype),
            |heap, target| heap.set_prototype_of(target, prototype),
        )
    }

    pub fn is_extensible(&mut self, object: &Value) -> Result<bool, EngineError> {
        self.reflect(
            object,
            Trap::IsExtensible,
            |handler, engine, target| handler.is_extensible(engine, target),
            |heap, target| heap.is_extensible(target),
        )
    }

    pub fn prevent_extensions(&mut self, object: &Value) -> Result<bool, EngineError> {
        self.reflect(
            object,
            Trap::PreventExtensions,
            |handler, engine, target| handler.prevent_extensions(engine, target),
            |heap, target| heap.prevent_extensions(target),
        )
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Render `value` as JSON, seeing through wrappers.
    pub fn to_json(&self, value: &Value) -> Result<serde_json::Value, EngineError> {
        self.heap
            .export_json(value, &|proxy| self.nodes.target(proxy).ok())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Run the native body of `callee`.
    fn invoke_native(
        &mut self,
        callee: ObjectId,
        this: Value,
        args: Vec<Value>,
        new_target: Option<ObjectId>,
    ) -> Result<Value, EngineError> {
        let function = self.heap.function(callee)?;
        (function.body)(
            self,
            Invocation {
                callee,
                this,
                args,
                new_target,
            },
        )
    }

    /// Allocate an instance inheriting from `callee.prototype` and run the
    /// body on it. An object returned by the body replaces the instance.
    fn construct_native(&mut self, callee: ObjectId, args: Vec<Value>) -> Result<Value, EngineError> {
        let function = self
            .heap
            .function(callee)
            .map_err(|_| EngineError::NotConstructor(callee.to_string()))?;
        if !function.constructable {
            return Err(EngineError::NotConstructor(function.name));
        }

        let prototype = match self.heap.get(callee, &PropertyKey::from(PROTOTYPE))? {
            Value::Object(id) => Some(id),
            Value::Proxy(proxy) => Some(self.nodes.target(proxy)?),
            _ => None,
        };
        let instance = self.heap.alloc(ObjectKind::Plain, prototype);
        let result = (function.body)(
            self,
            Invocation {
                callee,
                this: Value::Object(instance),
                args,
                new_target: Some(callee),
            },
        )?;
        Ok(match result {
            Value::Object(_) | Value::Proxy(_) => result,
            _ => Value::Object(instance),
        })
    }

    /// Path of `key` under `node`, shaped per `path_as_array`. Without a node
    /// the path is the root's.
    fn trace_path(&self, node: Option<ProxyId>, key: Option<&PropertyKey>) -> Result<TracedPath, EngineError> {
        let lineage = match node {
            Some(node) => self.nodes.lineage(node)?,
            None => Vec::new(),
        };
        let traced = path::trace(&lineage, key);
        Ok(if self.settings.path_as_array {
            traced.into_segments()
        } else {
            traced
        })
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.root)
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("objects", &self.heap.len())
            .field("wrappers", &self.nodes.len())
            .field("handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{callback, EventRecord, Reply};
    use serde_json::json;
    use std::cell::RefCell;

    fn engine(doc: serde_json::Value) -> Engine {
        Engine::from_json(&doc, RawSettings::new()).expect("engine")
    }

    #[test]
    fn primitive_root_is_not_wrapped() {
        let engine = engine(json!(5));
        assert_eq!(engine.proxy(), Value::from(5));
        assert_eq!(engine.wrapper_count(), 0);
    }

    #[test]
    fn object_root_is_wrapped_without_a_parent() {
        let engine = engine(json!({"a": 1}));
        let Value::Proxy(root) = engine.proxy() else {
            panic!("root should be wrapped");
        };
        let node = engine.node(root).unwrap();
        assert_eq!(node.parent(), None);
        assert_eq!(node.parent_key(), None);
    }

    #[test]
    fn nested_reads_wrap_once_per_location() {
        let mut engine = engine(json!({"a": {"b": [1, 2]}}));
        let root = engine.proxy();
        let first = engine.resolve_path(&root, &["a", "b"]).unwrap();
        let second = engine.resolve_path(&root, &["a", "b"]).unwrap();

        assert!(first.is_proxy());
        assert_eq!(first, second);
        // root, a, a.b
        assert_eq!(engine.wrapper_count(), 3);
    }

    #[test]
    fn primitives_fail_as_objects() {
        let mut engine = engine(json!({}));
        assert!(matches!(
            engine.get(&Value::from(1), "x"),
            Err(EngineError::NotAnObject(_))
        ));
        assert!(matches!(
            engine.call(&Value::Null, Value::Undefined, vec![]),
            Err(EngineError::NotCallable(_))
        ));
        let root = engine.proxy();
        assert!(matches!(
            engine.call(&root, Value::Undefined, vec![]),
            Err(EngineError::NotCallable(_))
        ));
        assert!(matches!(
            engine.construct(&root, vec![]),
            Err(EngineError::NotConstructor(_))
        ));
    }

    #[test]
    fn raw_objects_bypass_interception() {
        let seen: Rc<RefCell<Vec<EventRecord>>> = Rc::default();
        let mut engine = engine(json!({"a": {"n": 1}}));
        let sink = seen.clone();
        engine
            .on(
                EventKind::Get,
                callback(move |record| {
                    sink.borrow_mut().push(record.clone());
                    Reply::Canceled
                }),
            )
            .unwrap();

        let root = engine.proxy();
        let raw = Value::Object(engine.target_of(&root).unwrap());
        engine.get(&raw, "a").unwrap();
        assert!(seen.borrow().is_empty());

        engine.get(&root, "a").unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn reflective_defaults_reach_the_heap() {
        let mut engine = engine(json!({"a": 1, "b": 2}));
        let root = engine.proxy();

        assert!(engine.has(&root, "a").unwrap());
        assert!(!engine.has(&root, "z").unwrap());
        assert_eq!(
            engine.own_keys(&root).unwrap(),
            vec![PropertyKey::from("a"), PropertyKey::from("b")]
        );
        assert_eq!(
            engine.get_own_property_descriptor(&root, "a").unwrap(),
            Some(PropertyDescriptor::data(Value::from(1)))
        );
        assert!(engine.is_extensible(&root).unwrap());
        assert!(engine.prevent_extensions(&root).unwrap());
        assert!(!engine.is_extensible(&root).unwrap());
        assert_eq!(engine.get_prototype_of(&root).unwrap(), Value::Null);
    }

    #[test]
    fn set_prototype_accepts_wrappers() {
        let mut engine = engine(json!({"base": {"greeting": "hi"}, "child": {}}));
        let root = engine.proxy();
        let base = engine.get(&root, "base").unwrap();
        let child = engine.get(&root, "child").unwrap();

        assert!(engine.set_prototype_of(&child, &base).unwrap());
        assert_eq!(engine.get(&child, "greeting").unwrap(), Value::from("hi"));
        assert_eq!(
            engine.set_prototype_of(&base, &child),
            Err(EngineError::PrototypeCycle)
        );
        assert!(matches!(
            engine.set_prototype_of(&child, &Value::from(3)),
            Err(EngineError::NotAnObject(_))
        ));
    }

    #[test]
    fn to_json_sees_through_wrappers() {
        let doc = json!({"list": [1, {"x": true}], "name": "n"});
        let mut engine = engine(doc.clone());
        let root = engine.proxy();
        engine.resolve_path(&root, &["list", "1"]).unwrap();

        assert_eq!(engine.to_json(&root).unwrap(), doc);
    }
}
