//! Host function registry.
//!
//! The host registers native functions explicitly as `(name, arity,
//! callable)` entries, grouped so a plugin can withdraw everything it added
//! in one call. Scripts reach them through the `CALL` opcode.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

/// Native callable invoked by `CALL`. Errors are reported as plain messages
/// and turn into a script fault.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Lookup key of a host function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    pub name: String,
    pub arity: usize,
}

impl Signature {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("function {0} is already registered")]
    Duplicate(Signature),
}

/// Capability table of host functions.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<Signature, NativeFn>,
    groups: HashMap<String, Vec<Signature>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` as `name` taking exactly `arity` arguments.
    pub fn register<F>(
        &mut self,
        group: &str,
        name: &str,
        arity: usize,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        let sig = Signature::new(name, arity);
        if self.functions.contains_key(&sig) {
            return Err(RegistryError::Duplicate(sig));
        }
        log::debug!("registered host function {} in group {}", sig, group);
        self.groups.entry(group.to_string()).or_default().push(sig.clone());
        self.functions.insert(sig, Arc::new(func));
        Ok(())
    }

    /// Remove every function registered under `group`. Returns how many
    /// were removed.
    pub fn unregister_group(&mut self, group: &str) -> usize {
        let Some(sigs) = self.groups.remove(group) else {
            return 0;
        };
        for sig in &sigs {
            self.functions.remove(sig);
        }
        log::debug!("unregistered {} host functions from group {}", sigs.len(), group);
        sigs.len()
    }

    pub fn lookup(&self, name: &str, arity: usize) -> Option<&NativeFn> {
        // HashMap lookups need an owned key; names are short.
        self.functions.get(&Signature::new(name, arity))
    }

    pub fn contains(&self, name: &str, arity: usize) -> bool {
        self.lookup(name, arity).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Group names, sorted.
    pub fn groups(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// All registered signatures, sorted.
    pub fn signatures(&self) -> Vec<&Signature> {
        let mut sigs: Vec<_> = self.functions.keys().collect();
        sigs.sort();
        sigs
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.signatures())
            .field("groups", &self.groups())
            .finish()
    }
}
