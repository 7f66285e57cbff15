//! JSON bridge: build graphs from documents and render them back.

use super::{Heap, ObjectId, ObjectKind, PropertyKey, ProxyId, Value};
use crate::error::EngineError;
use serde_json::{Map, Number};

/// Longest array, holes included, that [`Heap::export_json`] will render.
pub const MAX_EXPORT_LENGTH: usize = 1 << 24;

impl Heap {
    /// Allocate the objects of a JSON document and return its root value.
    pub fn import_json(&mut self, json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                let items = items.iter().map(|item| self.import_json(item)).collect();
                Value::Object(self.alloc_array(items))
            }
            serde_json::Value::Object(fields) => {
                let fields: Vec<(String, Value)> = fields
                    .iter()
                    .map(|(key, item)| (key.clone(), self.import_json(item)))
                    .collect();
                Value::Object(self.alloc_record(fields))
            }
        }
    }

    /// Render `value` as JSON.
    ///
    /// `resolve` maps wrapper handles to the objects they wrap. Functions and
    /// `undefined` render as `null`; holes in arrays render as `null`.
    pub fn export_json(
        &self,
        value: &Value,
        resolve: &dyn Fn(ProxyId) -> Option<ObjectId>,
    ) -> Result<serde_json::Value, EngineError> {
        let mut ancestors = Vec::new();
        self.export_value(value, resolve, &mut ancestors, "")
    }

    fn export_value(
        &self,
        value: &Value,
        resolve: &dyn Fn(ProxyId) -> Option<ObjectId>,
        ancestors: &mut Vec<ObjectId>,
        at: &str,
    ) -> Result<serde_json::Value, EngineError> {
        let id = match value {
            Value::Undefined | Value::Null => return Ok(serde_json::Value::Null),
            Value::Bool(b) => return Ok(serde_json::Value::Bool(*b)),
            Value::Number(n) => return Ok(number(*n)),
            Value::String(s) => return Ok(serde_json::Value::String(s.clone())),
            Value::Object(id) => *id,
            Value::Proxy(proxy) => resolve(*proxy).ok_or(EngineError::ProxyNotFound(*proxy))?,
        };
        if ancestors.contains(&id) {
            return Err(EngineError::Cyclic(at.to_string()));
        }

        let object = self.object(id)?;
        ancestors.push(id);
        let rendered = match object.kind() {
            ObjectKind::Function => serde_json::Value::Null,
            ObjectKind::Array => {
                let length = self.get(id, &PropertyKey::from("length"))?;
                let length = length.as_number().unwrap_or(0.0) as usize;
                if length > MAX_EXPORT_LENGTH {
                    return Err(EngineError::ArrayTooLong {
                        at: at.to_string(),
                        length,
                        max: MAX_EXPORT_LENGTH,
                    });
                }
                let mut items = Vec::new();
                for index in 0..length {
                    let item = self.get(id, &index.into())?;
                    let at = format!("{at}[{index}]");
                    items.push(self.export_value(&item, resolve, ancestors, &at)?);
                }
                serde_json::Value::Array(items)
            }
            ObjectKind::Plain => {
                let mut fields = Map::new();
                for key in self.enumerable_keys(id)? {
                    let item = self.get(id, &key)?;
                    let at = if at.is_empty() {
                        key.to_string()
                    } else {
                        format!("{at}.{key}")
                    };
                    let rendered = self.export_value(&item, resolve, ancestors, &at)?;
                    fields.insert(key.to_string(), rendered);
                }
                serde_json::Value::Object(fields)
            }
        };
        ancestors.pop();
        Ok(rendered)
    }
}

fn number(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
