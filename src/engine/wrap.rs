//! Recursive Wrapper Factory
//!
//! Every wrapper is a [`WrapNode`] in an arena owned by the engine. Nodes
//! refer to their parent by [`ProxyId`], which is only ever followed to build
//! paths. Wrapping is positional: the same object stored at two locations
//! gets two nodes, one per location.

use super::Engine;
use crate::error::EngineError;
use crate::heap::{ObjectId, PropertyKey, ProxyId, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One wrapped object at one location in the graph.
#[derive(Debug, Clone)]
pub struct WrapNode {
    target: ObjectId,
    parent: Option<ProxyId>,
    parent_key: Option<PropertyKey>,
    wrapped_keys: HashSet<PropertyKey>,
}

impl WrapNode {
    /// The raw object behind the wrapper.
    pub fn target(&self) -> ObjectId {
        self.target
    }

    pub fn parent(&self) -> Option<ProxyId> {
        self.parent
    }

    pub fn parent_key(&self) -> Option<&PropertyKey> {
        self.parent_key.as_ref()
    }

    /// Whether the slot `key` on the target already holds this node's
    /// wrapper for it.
    pub fn is_wrapped(&self, key: &PropertyKey) -> bool {
        self.wrapped_keys.contains(key)
    }
}

#[derive(Debug, Default)]
pub(crate) struct WrapArena {
    nodes: Vec<WrapNode>,
}

impl WrapArena {
    fn insert(&mut self, node: WrapNode) -> ProxyId {
        let id = ProxyId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn get(&self, id: ProxyId) -> Result<&WrapNode, EngineError> {
        self.nodes
            .get(id.0 as usize)
            .ok_or(EngineError::ProxyNotFound(id))
    }

    fn get_mut(&mut self, id: ProxyId) -> Result<&mut WrapNode, EngineError> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or(EngineError::ProxyNotFound(id))
    }

    pub(crate) fn target(&self, id: ProxyId) -> Result<ObjectId, EngineError> {
        Ok(self.get(id)?.target)
    }

    /// Parent keys from the root down to `id`.
    ///
    /// Parents are always allocated before their children, so the walk
    /// terminates.
    pub(crate) fn lineage(&self, id: ProxyId) -> Result<Vec<PropertyKey>, EngineError> {
        let mut keys = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            if let Some(key) = &current.parent_key {
                keys.push(key.clone());
            }
            current = self.get(parent)?;
        }
        keys.reverse();
        Ok(keys)
    }

    pub(crate) fn mark(&mut self, id: ProxyId, key: PropertyKey) -> Result<(), EngineError> {
        self.get_mut(id)?.wrapped_keys.insert(key);
        Ok(())
    }

    pub(crate) fn unmark(&mut self, id: ProxyId, key: &PropertyKey) -> Result<(), EngineError> {
        self.get_mut(id)?.wrapped_keys.remove(key);
        Ok(())
    }
}

impl Engine {
    /// Wrap `value` as the child `parent_key` of `parent`.
    ///
    /// Primitives pass through. Wrapping an existing wrapper wraps the object
    /// behind it again at the new location.
    pub(crate) fn wrap(
        &mut self,
        value: Value,
        parent: Option<ProxyId>,
        parent_key: Option<PropertyKey>,
    ) -> Result<Value, EngineError> {
        let target = match value {
            Value::Object(id) => id,
            Value::Proxy(proxy) => self.nodes.target(proxy)?,
            primitive => return Ok(primitive),
        };
        self.heap.object(target)?;

        let proxy = self.nodes.insert(WrapNode {
            target,
            parent,
            parent_key,
            wrapped_keys: HashSet::new(),
        });
        debug!(%target, %proxy, parent = ?parent, "wrapped");
        Ok(Value::Proxy(proxy))
    }

    /// Make sure slot `key` of `proxy`'s target holds a wrapper if it holds an
    /// object, writing the wrapper back into the slot.
    ///
    /// Inherited objects are wrapped into a new own slot that shadows the
    /// prototype's.
    pub(crate) fn materialize(&mut self, proxy: ProxyId, key: &PropertyKey) -> Result<(), EngineError> {
        let node = self.nodes.get(proxy)?;
        if node.is_wrapped(key) {
            return Ok(());
        }
        let target = node.target;
        let value = self.heap.get(target, key)?;
        if value.is_primitive() {
            return Ok(());
        }

        // Already holds this location's wrapper, e.g. after an overridden delete.
        if let Value::Proxy(existing) = value {
            let existing = self.nodes.get(existing)?;
            if existing.parent == Some(proxy) && existing.parent_key.as_ref() == Some(key) {
                return self.nodes.mark(proxy, key.clone());
            }
        }

        if !self.heap.can_assign(target, key)? {
            warn!(%target, %key, "slot is read-only, value stays unwrapped");
            return Ok(());
        }
        let wrapped = self.wrap(value, Some(proxy), Some(key.clone()))?;
        self.heap.set(target, key.clone(), wrapped)?;
        self.nodes.mark(proxy, key.clone())
    }

    /// Store `value` in slot `key` of `proxy`'s target, wrapping it first
    /// when it is an object.
    pub(crate) fn store(
        &mut self,
        proxy: ProxyId,
        key: PropertyKey,
        value: Value,
    ) -> Result<bool, EngineError> {
        let target = self.nodes.target(proxy)?;
        if !self.heap.can_assign(target, &key)? {
            return Ok(false);
        }
        let stored = match self.rewritten_node(proxy, &key, &value)? {
            Some(existing) => Value::Proxy(existing),
            None => self.wrap(value, Some(proxy), Some(key.clone()))?,
        };
        let written = self.heap.set(target, key.clone(), stored)?;
        if written {
            self.nodes.mark(proxy, key)?;
        }
        Ok(written)
    }

    /// The wrapper already sitting in own slot `key` of `proxy`'s target, if
    /// it was made for this location and fronts the same object as `value`.
    fn rewritten_node(
        &self,
        proxy: ProxyId,
        key: &PropertyKey,
        value: &Value,
    ) -> Result<Option<ProxyId>, EngineError> {
        let incoming = match value {
            Value::Object(id) => *id,
            Value::Proxy(other) => self.nodes.target(*other)?,
            _ => return Ok(None),
        };
        let target = self.nodes.target(proxy)?;
        let Some(current) = self.heap.get_own_property_descriptor(target, key)? else {
            return Ok(None);
        };
        let Value::Proxy(existing) = current.value else {
            return Ok(None);
        };
        let node = self.nodes.get(existing)?;
        let same_location = node.parent == Some(proxy) && node.parent_key.as_ref() == Some(key);
        Ok((same_location && node.target == incoming).then_some(existing))
    }
}
