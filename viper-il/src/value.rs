//! IL operand values.

use core::fmt;
use core::hash::{Hash, Hasher};

/// Dense identifier of an SSA temporary, unique within its function.
pub type TempId = u32;

/// A four-way discriminated operand.
///
/// Float literals compare and hash by bit pattern so `-0.0` and distinct NaN
/// payloads survive round trips through containers and the text format.
#[derive(Debug, Clone)]
pub enum Value {
    /// Reference to an SSA temporary.
    Temp(TempId),
    /// 64-bit signed integer literal.
    ConstInt(i64),
    /// 64-bit IEEE-754 literal.
    ConstFloat(f64),
    /// Symbolic reference to a module global.
    GlobalRef(String),
    /// Typed null pointer constant.
    Null,
}

impl Value {
    /// Shorthand constructor for a temp reference.
    pub const fn temp(id: TempId) -> Self {
        Value::Temp(id)
    }

    /// Shorthand constructor for an integer literal.
    pub const fn const_int(v: i64) -> Self {
        Value::ConstInt(v)
    }

    /// Shorthand constructor for a float literal.
    pub const fn const_float(v: f64) -> Self {
        Value::ConstFloat(v)
    }

    /// The temp id, if this operand is a temp reference.
    pub const fn as_temp(&self) -> Option<TempId> {
        match self {
            Value::Temp(id) => Some(*id),
            _ => None,
        }
    }

    /// The literal integer, if this operand is one.
    pub const fn as_const_int(&self) -> Option<i64> {
        match self {
            Value::ConstInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The literal float, if this operand is one.
    pub const fn as_const_float(&self) -> Option<f64> {
        match self {
            Value::ConstFloat(v) => Some(*v),
            _ => None,
        }
    }

    /// True for literals (`ConstInt`, `ConstFloat`, `Null`).
    pub const fn is_literal(&self) -> bool {
        matches!(self, Value::ConstInt(_) | Value::ConstFloat(_) | Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Temp(a), Value::Temp(b)) => a == b,
            (Value::ConstInt(a), Value::ConstInt(b)) => a == b,
            // Bit-pattern equality keeps -0.0 and NaN payloads distinct.
            (Value::ConstFloat(a), Value::ConstFloat(b)) => a.to_bits() == b.to_bits(),
            (Value::GlobalRef(a), Value::GlobalRef(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Temp(id) => id.hash(state),
            Value::ConstInt(v) => v.hash(state),
            Value::ConstFloat(v) => v.to_bits().hash(state),
            Value::GlobalRef(name) => name.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Temp(id) => write!(f, "%t{id}"),
            Value::ConstInt(v) => write!(f, "{v}"),
            Value::ConstFloat(v) => f.write_str(&crate::text::format_float(*v)),
            Value::GlobalRef(name) => write!(f, "@{name}"),
            Value::Null => f.write_str("null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn float_equality_is_bitwise() {
        assert_ne!(Value::const_float(0.0), Value::const_float(-0.0));
        assert_eq!(Value::const_float(f64::NAN), Value::const_float(f64::NAN));

        let mut set = HashSet::new();
        set.insert(Value::const_float(0.0));
        set.insert(Value::const_float(-0.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn literal_classification() {
        assert!(Value::const_int(1).is_literal());
        assert!(Value::Null.is_literal());
        assert!(!Value::temp(0).is_literal());
        assert!(!Value::GlobalRef("g".into()).is_literal());
    }
}
