//! IL modules, externs, and globals
//!
//! A module owns its externs and functions exclusively. Globals are
//! inline byte blobs addressed by symbolic name (`Value::GlobalAddr`).

use crate::func::Function;
use crate::types::Type;

/// External function declaration, resolved through the runtime bridge or
/// at link time.
#[derive(Debug, Clone, PartialEq)]
pub struct Extern {
    /// Unique among externs in a module; non-empty.
    pub name: String,
    pub ret: Type,
    /// Arity and order must match the target's actual ABI.
    pub params: Vec<Type>,
}

/// A named constant blob (string/byte data).
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Version from the `il <major>.<minor>.<patch>` header.
    pub version: (u32, u32, u32),
    pub externs: Vec<Extern>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Module {
        Module {
            version: crate::IL_VERSION,
            ..Module::default()
        }
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn find_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn find_extern(&self, name: &str) -> Option<&Extern> {
        self.externs.iter().find(|e| e.name == name)
    }

    pub fn find_global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Declare an extern unless one with the same name already exists.
    pub fn declare_extern(&mut self, name: impl Into<String>, ret: Type, params: Vec<Type>) {
        let name = name.into();
        if self.find_extern(&name).is_none() {
            self.externs.push(Extern { name, ret, params });
        }
    }

    /// Add a global blob, returning its name.
    pub fn add_global(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> String {
        let name = name.into();
        self.globals.push(Global {
            name: name.clone(),
            bytes,
        });
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_extern_is_idempotent() {
        let mut m = Module::new();
        m.declare_extern("rt_print_i64", Type::Void, vec![Type::I64]);
        m.declare_extern("rt_print_i64", Type::Void, vec![Type::I64]);
        assert_eq!(m.externs.len(), 1);
        assert!(m.find_extern("rt_print_i64").is_some());
    }

    #[test]
    fn test_lookup() {
        let mut m = Module::new();
        m.functions.push(Function::new("main", Type::I64, vec![]));
        m.add_global(".L0", b"hi".to_vec());
        assert!(m.find_function("main").is_some());
        assert!(m.find_function("other").is_none());
        assert_eq!(m.find_global(".L0").unwrap().bytes, b"hi");
    }
}
