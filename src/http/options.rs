use http::{HeaderMap, Method};
use serde_json::{Map, Value};

/// Caller-supplied request settings. Every field is optional; unset fields are filled in from
/// defaults with [`MergeDefaults`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub params: Map<String, Value>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Deep "fill in what is missing" merge.
///
/// `self` is what the caller set explicitly and always wins. `defaults` only contributes keys
/// that `self` does not have; nested objects are merged recursively under the same rule.
pub trait MergeDefaults: Sized {
    fn merge_defaults(self, defaults: Self) -> Self;
}

impl MergeDefaults for Value {
    fn merge_defaults(self, defaults: Self) -> Self {
        match (self, defaults) {
            (Value::Object(existing), Value::Object(defaults)) => {
                Value::Object(existing.merge_defaults(defaults))
            }
            (existing, _) => existing,
        }
    }
}

impl MergeDefaults for Map<String, Value> {
    fn merge_defaults(mut self, defaults: Self) -> Self {
        for (key, default) in defaults {
            match self.get_mut(&key) {
                Some(existing) => {
                    *existing = std::mem::take(existing).merge_defaults(default);
                }
                None => {
                    self.insert(key, default);
                }
            }
        }
        self
    }
}

impl MergeDefaults for HeaderMap {
    fn merge_defaults(mut self, defaults: Self) -> Self {
        let mut current = None;
        for (name, value) in defaults {
            // `None` names continue the previous header's values.
            if let Some(name) = name {
                current = (!self.contains_key(&name)).then_some(name);
                if let Some(name) = &current {
                    self.insert(name.clone(), value);
                }
            } else if let Some(name) = &current {
                self.append(name.clone(), value);
            }
        }
        self
    }
}

impl MergeDefaults for RequestOptions {
    fn merge_defaults(self, defaults: Self) -> Self {
        let body = match (self.body, defaults.body) {
            (Some(existing), Some(default)) => Some(existing.merge_defaults(default)),
            (existing, default) => existing.or(default),
        };
        RequestOptions {
            method: self.method.or(defaults.method),
            params: self.params.merge_defaults(defaults.params),
            body,
            headers: self.headers.merge_defaults(defaults.headers),
        }
    }
}
