//! Object Heap
//!
//! The graph an engine wraps lives in an arena of objects addressed by
//! [`ObjectId`]. The heap implements the plain (unobserved) behavior of every
//! structural operation; the engine falls back to these whenever an
//! intercepted operation proceeds with its default action.
//!
//! - Own properties keep insertion order, with integer keys listed first
//! - Property reads walk the prototype chain
//! - Arrays expose a read-only virtual `length`
//! - Functions carry a native body that receives the engine

mod json;
mod value;

pub use json::MAX_EXPORT_LENGTH;
pub use value::{ObjectId, PropertyKey, ProxyId, Value, MAX_ARRAY_LENGTH};

use crate::engine::Engine;
use crate::error::EngineError;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Maximum prototype chain depth walked before giving up.
const MAX_PROTOTYPE_CHAIN_DEPTH: u32 = 1024;

const LENGTH: &str = "length";
const PROTOTYPE: &str = "prototype";

// ============================================================================
// Descriptors
// ============================================================================

/// A data property descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub value: Value,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// Writable, enumerable, configurable.
    pub fn data(value: Value) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable.
    pub fn frozen(value: Value) -> Self {
        Self {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Arguments of a native function invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The function object being invoked.
    pub callee: ObjectId,
    /// Receiver; the freshly allocated instance when constructing.
    pub this: Value,
    pub args: Vec<Value>,
    /// Set when invoked as a constructor.
    pub new_target: Option<ObjectId>,
}

impl Invocation {
    /// Argument `index`, or `undefined` when absent.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }
}

/// Body of a native function.
pub type NativeBody = Rc<dyn Fn(&mut Engine, Invocation) -> Result<Value, EngineError>>;

/// Callable part of a function object.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub body: NativeBody,
    pub constructable: bool,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("constructable", &self.constructable)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Plain,
    Array,
    Function,
}

#[derive(Debug, Clone)]
pub struct Object {
    kind: ObjectKind,
    prototype: Option<ObjectId>,
    extensible: bool,
    properties: IndexMap<PropertyKey, PropertyDescriptor>,
    function: Option<NativeFunction>,
}

impl Object {
    fn new(kind: ObjectKind, prototype: Option<ObjectId>) -> Self {
        Self {
            kind,
            prototype,
            extensible: true,
            properties: IndexMap::new(),
            function: None,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn is_callable(&self) -> bool {
        self.function.is_some()
    }

    pub fn is_constructor(&self) -> bool {
        self.function.as_ref().is_some_and(|f| f.constructable)
    }

    /// One past the highest index key.
    fn array_length(&self) -> usize {
        self.properties
            .keys()
            .filter_map(PropertyKey::as_index)
            .map(|i| i + 1)
            .max()
            .unwrap_or(0)
    }

    fn is_array_length(&self, key: &PropertyKey) -> bool {
        self.kind == ObjectKind::Array && key.as_str() == LENGTH
    }

    fn own_descriptor(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        if self.is_array_length(key) {
            let length = Value::Number(self.array_length() as f64);
            return Some(PropertyDescriptor::frozen(length));
        }
        self.properties.get(key).cloned()
    }
}

// ============================================================================
// Heap
// ============================================================================

/// Arena of objects.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects allocated.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn push(&mut self, object: Object) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    /// Allocate an empty object of `kind` with the given prototype.
    pub fn alloc(&mut self, kind: ObjectKind, prototype: Option<ObjectId>) -> ObjectId {
        self.push(Object::new(kind, prototype))
    }

    /// Allocate an empty plain object.
    pub fn alloc_plain(&mut self) -> ObjectId {
        self.alloc(ObjectKind::Plain, None)
    }

    /// Allocate a plain object with the given properties.
    pub fn alloc_record<K, I>(&mut self, fields: I) -> ObjectId
    where
        K: Into<PropertyKey>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut object = Object::new(ObjectKind::Plain, None);
        for (key, value) in fields {
            object
                .properties
                .insert(key.into(), PropertyDescriptor::data(value));
        }
        self.push(object)
    }

    /// Allocate an array holding `items` at indices `0..items.len()`.
    pub fn alloc_array(&mut self, items: Vec<Value>) -> ObjectId {
        let mut object = Object::new(ObjectKind::Array, None);
        for (index, item) in items.into_iter().enumerate() {
            object
                .properties
                .insert(index.into(), PropertyDescriptor::data(item));
        }
        self.push(object)
    }

    /// Allocate a callable function object.
    pub fn alloc_function<F>(&mut self, name: &str, body: F) -> ObjectId
    where
        F: Fn(&mut Engine, Invocation) -> Result<Value, EngineError> + 'static,
    {
        let mut object = Object::new(ObjectKind::Function, None);
        object.function = Some(NativeFunction {
            name: name.to_string(),
            body: Rc::new(body),
            constructable: false,
        });
        self.push(object)
    }

    /// Allocate a constructor. Instances inherit from its `prototype` object.
    pub fn alloc_constructor<F>(&mut self, name: &str, body: F) -> ObjectId
    where
        F: Fn(&mut Engine, Invocation) -> Result<Value, EngineError> + 'static,
    {
        let prototype = self.alloc_plain();
        let mut object = Object::new(ObjectKind::Function, None);
        object.function = Some(NativeFunction {
            name: name.to_string(),
            body: Rc::new(body),
            constructable: true,
        });
        object.properties.insert(
            PROTOTYPE.into(),
            PropertyDescriptor {
                enumerable: false,
                configurable: false,
                ..PropertyDescriptor::data(Value::Object(prototype))
            },
        );
        self.push(object)
    }

    pub fn object(&self, id: ObjectId) -> Result<&Object, EngineError> {
        self.objects
            .get(id.0 as usize)
            .ok_or(EngineError::ObjectNotFound(id))
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object, EngineError> {
        self.objects
            .get_mut(id.0 as usize)
            .ok_or(EngineError::ObjectNotFound(id))
    }

    /// The callable part of `id`, or `NotCallable`.
    pub fn function(&self, id: ObjectId) -> Result<NativeFunction, EngineError> {
        self.object(id)?
            .function
            .clone()
            .ok_or_else(|| EngineError::NotCallable(id.to_string()))
    }

    /// Walk the prototype chain starting at `start`, stopping at the first
    /// object for which `visit` returns `Some`.
    fn walk_chain<T>(
        &self,
        start: Option<ObjectId>,
        mut visit: impl FnMut(ObjectId, &Object) -> Option<T>,
    ) -> Result<Option<T>, EngineError> {
        let mut current = start;
        let mut depth: u32 = 0;
        let mut visited = HashSet::new();

        while let Some(id) = current {
            if depth > MAX_PROTOTYPE_CHAIN_DEPTH {
                return Err(EngineError::PrototypeChainTooDeep {
                    depth,
                    max: MAX_PROTOTYPE_CHAIN_DEPTH,
                });
            }
            if !visited.insert(id) {
                return Err(EngineError::PrototypeCycle);
            }
            let object = self.object(id)?;
            if let Some(found) = visit(id, object) {
                return Ok(Some(found));
            }
            current = object.prototype;
            depth += 1;
        }
        Ok(None)
    }

    // -- [[Get]] ---------------------------------------------------------------

    /// Read `key`, walking the prototype chain. Missing keys read as `undefined`.
    pub fn get(&self, id: ObjectId, key: &PropertyKey) -> Result<Value, EngineError> {
        let found = self.walk_chain(Some(id), |_, object| {
            object.own_descriptor(key).map(|desc| desc.value)
        })?;
        Ok(found.unwrap_or_default())
    }

    // -- [[Set]] ---------------------------------------------------------------

    /// Whether a `set` of `key` on `id` would succeed.
    pub fn can_assign(&self, id: ObjectId, key: &PropertyKey) -> Result<bool, EngineError> {
        let object = self.object(id)?;
        if let Some(desc) = object.own_descriptor(key) {
            return Ok(desc.writable);
        }
        let inherited = self.walk_chain(object.prototype, |_, proto| proto.own_descriptor(key))?;
        if let Some(desc) = inherited {
            if !desc.writable {
                return Ok(false);
            }
        }
        Ok(object.extensible)
    }

    /// Assign `key`. Updates an own writable property or creates a new own
    /// property when the object is extensible and nothing inherited forbids it.
    pub fn set(&mut self, id: ObjectId, key: PropertyKey, value: Value) -> Result<bool, EngineError> {
        if !self.can_assign(id, &key)? {
            return Ok(false);
        }
        let object = self.object_mut(id)?;
        match object.properties.get_mut(&key) {
            Some(desc) => desc.value = value,
            None => {
                object
                    .properties
                    .insert(key, PropertyDescriptor::data(value));
            }
        }
        Ok(true)
    }

    // -- [[Delete]] ------------------------------------------------------------

    /// Delete an own property. Non-configurable properties refuse;
    /// absent keys succeed vacuously.
    pub fn delete(&mut self, id: ObjectId, key: &PropertyKey) -> Result<bool, EngineError> {
        let object = self.object_mut(id)?;
        if object.is_array_length(key) {
            return Ok(false);
        }
        match object.properties.get(key) {
            Some(desc) if !desc.configurable => Ok(false),
            Some(_) => {
                object.properties.shift_remove(key);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    // -- [[HasProperty]] ---------------------------------------------------------

    pub fn has(&self, id: ObjectId, key: &PropertyKey) -> Result<bool, EngineError> {
        let found = self.walk_chain(Some(id), |_, object| object.own_descriptor(key).map(|_| ()))?;
        Ok(found.is_some())
    }

    pub fn has_own(&self, id: ObjectId, key: &PropertyKey) -> Result<bool, EngineError> {
        Ok(self.object(id)?.own_descriptor(key).is_some())
    }

    // -- [[OwnPropertyKeys]] -----------------------------------------------------

    /// Integer keys ascending, then `length` for arrays, then the remaining
    /// keys in insertion order.
    pub fn own_keys(&self, id: ObjectId) -> Result<Vec<PropertyKey>, EngineError> {
        let object = self.object(id)?;
        let mut indices: Vec<(usize, &PropertyKey)> = Vec::new();
        let mut names: Vec<&PropertyKey> = Vec::new();
        for key in object.properties.keys() {
            match key.as_index() {
                Some(index) => indices.push((index, key)),
                None => names.push(key),
            }
        }
        indices.sort_by_key(|(index, _)| *index);

        let mut keys: Vec<PropertyKey> = indices.into_iter().map(|(_, k)| k.clone()).collect();
        if object.kind == ObjectKind::Array {
            keys.push(LENGTH.into());
        }
        keys.extend(names.into_iter().cloned());
        Ok(keys)
    }

    /// Own enumerable keys in [`own_keys`](Self::own_keys) order.
    pub fn enumerable_keys(&self, id: ObjectId) -> Result<Vec<PropertyKey>, EngineError> {
        let object = self.object(id)?;
        Ok(self
            .own_keys(id)?
            .into_iter()
            .filter(|key| object.own_descriptor(key).is_some_and(|d| d.enumerable))
            .collect())
    }

    // -- Descriptors -------------------------------------------------------------

    pub fn get_own_property_descriptor(
        &self,
        id: ObjectId,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, EngineError> {
        Ok(self.object(id)?.own_descriptor(key))
    }

    /// Define or redefine an own property. Returns `false` when the change
    /// would violate a non-configurable property or extend a sealed object.
    pub fn define_property(
        &mut self,
        id: ObjectId,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, EngineError> {
        let object = self.object_mut(id)?;
        if object.is_array_length(&key) {
            return Ok(false);
        }
        match object.properties.get(&key) {
            Some(current) if !current.configurable => {
                if desc.configurable || desc.enumerable != current.enumerable {
                    return Ok(false);
                }
                if !current.writable && (desc.writable || desc.value != current.value) {
                    return Ok(false);
                }
            }
            Some(_) => {}
            None if !object.extensible => return Ok(false),
            None => {}
        }
        object.properties.insert(key, desc);
        Ok(true)
    }

    // -- Prototype and extensibility -----------------------------------------------

    pub fn get_prototype_of(&self, id: ObjectId) -> Result<Option<ObjectId>, EngineError> {
        Ok(self.object(id)?.prototype)
    }

    /// Change the prototype. Fails on cycles; refuses changes on
    /// non-extensible objects.
    pub fn set_prototype_of(
        &mut self,
        id: ObjectId,
        prototype: Option<ObjectId>,
    ) -> Result<bool, EngineError> {
        if prototype.is_some() {
            let closes_cycle = self.walk_chain(prototype, |ancestor, _| (ancestor == id).then_some(()))?;
            if closes_cycle.is_some() {
                return Err(EngineError::PrototypeCycle);
            }
        }
        let object = self.object_mut(id)?;
        if !object.extensible {
            return Ok(object.prototype == prototype);
        }
        object.prototype = prototype;
        Ok(true)
    }

    pub fn is_extensible(&self, id: ObjectId) -> Result<bool, EngineError> {
        Ok(self.object(id)?.extensible)
    }

    pub fn prevent_extensions(&mut self, id: ObjectId) -> Result<bool, EngineError> {
        self.object_mut(id)?.extensible = false;
        Ok(true)
    }
}
