//! Deepwatch: recursive interception of object graphs
//!
//! Wraps a nested object/function graph so that every structural operation
//! performed anywhere in it (reads, writes, deletes, calls, construction and
//! the reflective operations) is intercepted, located by a path from the
//! root, and offered to a registered callback before the real operation runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   Engine                    │
//! │                                             │
//! │  engine    - Wrapper factory and traps      │
//! │  events    - Registry, records, call stack  │
//! │  path      - Path tracing and formatting    │
//! │  settings  - Flags and their resolver       │
//! │                                             │
//! ├─────────────────────────────────────────────┤
//! │        Object heap (arena of objects)       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use deepwatch::{callback, Engine, EventKind, RawSettings, Reply};
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let mut engine = Engine::from_json(&json!({"a": [{"c": 1}]}), RawSettings::new()).unwrap();
//! let paths = Rc::new(RefCell::new(Vec::new()));
//! let sink = paths.clone();
//! engine
//!     .on(EventKind::Set, callback(move |event| {
//!         sink.borrow_mut().push(event.path.value.to_string());
//!         Reply::Canceled
//!     }))
//!     .unwrap();
//!
//! let root = engine.proxy();
//! let item = engine.resolve_path(&root, &["a", "0"]).unwrap();
//! engine.set(&item, "c", 2).unwrap();
//!
//! assert_eq!(paths.borrow().as_slice(), ["a[0].c"]);
//! ```

pub mod engine;
pub mod error;
pub mod events;
pub mod heap;
pub mod path;
pub mod script;
pub mod settings;

pub use engine::{Engine, Mode, Trap, TrapHandler, WrapNode};
pub use error::EngineError;
pub use events::{callback, Callback, EventKind, EventRecord, Reply};
pub use heap::{
    Heap, Invocation, ObjectId, ObjectKind, PropertyDescriptor, PropertyKey, ProxyId, Value,
    MAX_ARRAY_LENGTH, MAX_EXPORT_LENGTH,
};
pub use path::{format_path, split_path, Path, TracedPath};
pub use settings::{RawSettings, Settings};
