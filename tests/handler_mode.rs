mod common;

use common::{kinds, record_all};
use deepwatch::{
    callback, Engine, EngineError, EventKind, Mode, ObjectId, PropertyKey, ProxyId, RawSettings,
    Reply, TrapHandler, Value,
};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

fn engine(doc: serde_json::Value, handler: impl TrapHandler + 'static) -> Engine {
    Engine::from_json(&doc, Mode::Handler(Rc::new(handler))).expect("engine")
}

/// Masks `secret` and upper-cases every other string it reads.
struct Masking;

impl TrapHandler for Masking {
    fn get(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        key: &PropertyKey,
        _receiver: ProxyId,
    ) -> Option<Result<Value, EngineError>> {
        if key.as_str() == "secret" {
            return Some(Ok(Value::from("***")));
        }
        match engine.heap().get(target, key) {
            Ok(Value::String(s)) => Some(Ok(Value::from(s.to_uppercase()))),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }

    fn own_keys(&self, engine: &mut Engine, target: ObjectId) -> Option<Result<Vec<PropertyKey>, EngineError>> {
        let keys = engine.heap().own_keys(target).map(|keys| {
            keys.into_iter()
                .filter(|key| key.as_str() != "secret")
                .collect()
        });
        Some(keys)
    }

    fn has(
        &self,
        _engine: &mut Engine,
        _target: ObjectId,
        key: &PropertyKey,
    ) -> Option<Result<bool, EngineError>> {
        (key.as_str() == "secret").then_some(Ok(false))
    }
}

#[test]
fn overridden_traps_bypass_the_pipeline() {
    let mut engine = engine(json!({"secret": "pw", "name": "ann", "n": 1}), Masking);
    let log = record_all(&mut engine);
    let root = engine.proxy();

    assert_eq!(engine.get(&root, "secret").unwrap(), Value::from("***"));
    assert_eq!(engine.get(&root, "name").unwrap(), Value::from("ANN"));
    assert!(log.borrow().is_empty());

    // Not overridden: runs through the engine and emits.
    assert_eq!(engine.get(&root, "n").unwrap(), Value::from(1));
    assert_eq!(kinds(&log), vec![EventKind::Get]);
}

#[test]
fn reflective_overrides_apply_to_wrappers_only() {
    let mut engine = engine(json!({"name": "ann", "secret": "pw"}), Masking);
    let root = engine.proxy();

    assert_eq!(engine.own_keys(&root).unwrap(), vec![PropertyKey::from("name")]);
    assert!(!engine.has(&root, "secret").unwrap());
    assert!(engine.has(&root, "name").unwrap());

    let raw = Value::Object(engine.target_of(&root).unwrap());
    assert_eq!(engine.own_keys(&raw).unwrap().len(), 2);
    assert!(engine.has(&raw, "secret").unwrap());
}

#[test]
fn handler_settings_are_taken_literally() {
    let mut engine = engine(json!({"n": 1}), Masking);
    assert!(!engine.settings().default_action);

    engine
        .on(EventKind::Set, callback(|_| Reply::from(false)))
        .unwrap();
    let root = engine.proxy();
    assert!(!engine.set(&root, "n", 2).unwrap());
    assert_eq!(engine.get(&root, "n").unwrap(), Value::from(1));
}

struct Containing;

impl TrapHandler for Containing {
    fn settings(&self) -> RawSettings {
        RawSettings::new().contain_function_events(true)
    }
}

#[test]
fn handler_settings_skip_normalization() {
    let engine = engine(json!({}), Containing);
    let settings = engine.settings();
    assert!(!settings.default_action);
    assert!(settings.contain_function_events);

    let observed = Engine::from_json(&json!({}), Containing.settings()).unwrap();
    assert!(observed.settings().default_action);
}

/// Refuses writes and counts deletes.
#[derive(Default)]
struct Guard {
    deletes: Rc<Cell<u32>>,
}

impl TrapHandler for Guard {
    fn settings(&self) -> RawSettings {
        RawSettings::new().default_action(true)
    }

    fn set(
        &self,
        _engine: &mut Engine,
        _target: ObjectId,
        _key: &PropertyKey,
        _value: &Value,
        _receiver: ProxyId,
    ) -> Option<Result<bool, EngineError>> {
        Some(Ok(false))
    }

    fn delete_property(
        &self,
        engine: &mut Engine,
        target: ObjectId,
        key: &PropertyKey,
    ) -> Option<Result<bool, EngineError>> {
        self.deletes.set(self.deletes.get() + 1);
        Some(engine.heap_mut().delete(target, key))
    }
}

#[test]
fn handlers_can_refuse_or_reimplement_writes() {
    let guard = Guard::default();
    let deletes = guard.deletes.clone();
    let mut engine = engine(json!({"n": 1, "gone": true}), guard);
    let log = record_all(&mut engine);
    let root = engine.proxy();

    assert!(!engine.set(&root, "n", 2).unwrap());
    assert!(engine.delete(&root, "gone").unwrap());
    assert_eq!(deletes.get(), 1);
    assert!(log.borrow().is_empty());

    assert_eq!(engine.to_json(&root).unwrap(), json!({"n": 1}));
}
