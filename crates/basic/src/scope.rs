//! Lexical scope tracking
//!
//! A stack of name -> mangled-name maps. Resolution searches innermost
//! to outermost; shadowing an outer binding warns but is permitted.
//! Names arrive canonicalised (upper-cased) from the parser, so lookup
//! is effectively case-insensitive.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ScopeTracker {
    stack: Vec<HashMap<String, String>>,
    next_id: u32,
}

impl ScopeTracker {
    pub fn new() -> ScopeTracker {
        ScopeTracker::default()
    }

    /// Drop all scopes and reset local numbering.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.next_id = 0;
    }

    pub fn push_scope(&mut self) {
        self.stack.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.stack.pop();
    }

    pub fn has_scope(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Bind a name to a mangled form in the current scope.
    pub fn bind(&mut self, name: &str, mapped: impl Into<String>) {
        if let Some(scope) = self.stack.last_mut() {
            scope.insert(name.to_string(), mapped.into());
        }
    }

    pub fn is_declared_in_current_scope(&self, name: &str) -> bool {
        self.stack
            .last()
            .is_some_and(|scope| scope.contains_key(name))
    }

    /// Declare a local, producing a unique mangled name. Shadowing an
    /// outer binding is legal but worth a warning.
    pub fn declare_local(&mut self, name: &str) -> String {
        if self.resolve(name).is_some() && !self.is_declared_in_current_scope(name) {
            tracing::warn!(name, "local declaration shadows an outer binding");
        }
        let mangled = format!("{name}_{}", self.next_id);
        self.next_id += 1;
        self.bind(name, mangled.clone());
        mangled
    }

    /// Resolve a name from the innermost scope outwards.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_resolution_wins() {
        let mut scopes = ScopeTracker::new();
        scopes.push_scope();
        scopes.bind("X", "x_outer");
        scopes.push_scope();
        scopes.bind("X", "x_inner");
        assert_eq!(scopes.resolve("X").as_deref(), Some("x_inner"));
        scopes.pop_scope();
        assert_eq!(scopes.resolve("X").as_deref(), Some("x_outer"));
    }

    #[test]
    fn test_declare_local_mangles_uniquely() {
        let mut scopes = ScopeTracker::new();
        scopes.push_scope();
        let a = scopes.declare_local("N");
        scopes.push_scope();
        let b = scopes.declare_local("N");
        assert_ne!(a, b);
        assert!(scopes.is_declared_in_current_scope("N"));
        scopes.pop_scope();
        assert_eq!(scopes.resolve("N"), Some(a));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut scopes = ScopeTracker::new();
        scopes.push_scope();
        scopes.bind("A", "a_0");
        scopes.reset();
        assert!(!scopes.has_scope());
        assert_eq!(scopes.resolve("A"), None);
    }

    #[test]
    fn test_unresolved_name_is_none() {
        let mut scopes = ScopeTracker::new();
        scopes.push_scope();
        assert_eq!(scopes.resolve("GHOST"), None);
    }
}
