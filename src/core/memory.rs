use std::collections::BTreeMap;

use crate::error::VmError;
use crate::value::Value;

/// LIFO operand stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperandStack {
    items: Vec<Value>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    /// Pop the top value. An empty stack is a fault, never a panic.
    pub fn pop(&mut self) -> Result<Value, VmError> {
        self.items.pop().ok_or(VmError::StackUnderflow)
    }

    pub fn peek(&self) -> Option<&Value> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Values from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }
}

/// Variable storage.
///
/// Every variable is declared up front with a value that fixes its class.
/// Stores of any other class are rejected and leave the slot untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    vars: BTreeMap<String, Value>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            vars: BTreeMap::new(),
        }
    }

    /// Seed a variable, establishing its class. Replaces any earlier
    /// declaration of the same name and returns it.
    pub fn declare(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Load a variable's current value.
    pub fn load(&self, name: &str) -> Result<Value, VmError> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnknownVariable(name.to_string()))
    }

    /// Replace a declared variable's value, keeping its class fixed.
    pub fn store(&mut self, name: &str, value: Value) -> Result<(), VmError> {
        let slot = self
            .vars
            .get_mut(name)
            .ok_or_else(|| VmError::UnknownVariable(name.to_string()))?;
        let (current, incoming) = (slot.value_type(), value.value_type());
        if current != incoming {
            return Err(VmError::TypeMismatch {
                expected: current,
                found: incoming,
            });
        }
        *slot = value;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        let mut table = SymbolTable::new();
        for (name, value) in iter {
            table.declare(name, value);
        }
        table
    }
}
