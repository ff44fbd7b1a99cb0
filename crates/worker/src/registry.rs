//! Function registry: maps job function names to code.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::job::JobCall;

/// A callable job function.
pub type JobFunction = Arc<dyn Fn(&JobCall) -> anyhow::Result<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, JobFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `pattern`.
    ///
    /// Patterns are exact names, a category (`"mail.*"`) or the wildcard `"*"`.
    pub fn register<F>(&mut self, pattern: impl Into<String>, func: F)
    where
        F: Fn(&JobCall) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(pattern.into(), Arc::new(func));
    }

    /// Resolve a function name.
    pub fn get(&self, name: &str) -> Option<JobFunction> {
        // Try exact match first
        if let Some(f) = self.functions.get(name) {
            return Some(f.clone());
        }

        // Then the longest matching category ("mail.*" matches "mail.send")
        let category = self
            .functions
            .iter()
            .filter_map(|(pattern, f)| {
                let prefix = pattern.strip_suffix(".*")?;
                let rest = name.strip_prefix(prefix)?;
                rest.starts_with('.').then_some((prefix.len(), f))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, f)| f.clone());
        if category.is_some() {
            return category;
        }

        self.functions.get("*").cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn call(func: &str) -> JobCall {
        JobCall {
            func: func.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    #[test]
    fn exact_match_wins() {
        let mut registry = FunctionRegistry::new();
        registry.register("mail.send", |_| Ok(json!("exact")));
        registry.register("mail.*", |_| Ok(json!("category")));

        let f = registry.get("mail.send").unwrap();
        assert_eq!(f(&call("mail.send")).unwrap(), json!("exact"));
    }

    #[test]
    fn category_handler() {
        let mut registry = FunctionRegistry::new();
        registry.register("mail.*", |_| Ok(json!("category")));

        assert!(registry.contains("mail.digest"));
        assert!(!registry.contains("mailer.digest"));
    }

    #[test]
    fn wildcard_handler() {
        let mut registry = FunctionRegistry::new();
        registry.register("*", |_| Ok(Value::Null));

        assert!(registry.contains("anything"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        let registry = FunctionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("missing").is_none());
    }
}
