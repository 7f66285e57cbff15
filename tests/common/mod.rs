#![allow(dead_code)]

use deepwatch::{callback, Engine, EventKind, EventRecord, Reply};
use std::cell::RefCell;
use std::rc::Rc;

pub type Log = Rc<RefCell<Vec<EventRecord>>>;

/// Register a callback for each kind that records the event and declines.
pub fn record(engine: &mut Engine, kinds: &[EventKind]) -> Log {
    let log: Log = Rc::default();
    for kind in kinds {
        let sink = log.clone();
        engine
            .on(
                *kind,
                callback(move |event| {
                    sink.borrow_mut().push(event.clone());
                    Reply::Canceled
                }),
            )
            .expect("register");
    }
    log
}

pub fn record_all(engine: &mut Engine) -> Log {
    record(engine, &EventKind::OBSERVABLE)
}

pub fn kinds(log: &Log) -> Vec<EventKind> {
    log.borrow().iter().map(|event| event.kind).collect()
}

pub fn value_paths(log: &Log) -> Vec<String> {
    log.borrow()
        .iter()
        .map(|event| event.path.value.to_string())
        .collect()
}
