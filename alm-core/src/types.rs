//! Core type system for ALM.
//!
//! Types are a closed set of primitives, arrays of a primitive element
//! type with a dimension count, and an `Undefined` sentinel used while
//! recovering from errors. Equality is structural and derived.
//!
//! Numeric widening follows a total order ("cast priority"):
//!
//! ```text
//! byte < short < char < integer < long < float
//! ```
//!
//! A value may be implicitly widened to any type of equal or higher
//! priority, except that nothing but `char` widens into `char`.

use std::fmt;

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Void,
    /// 8-bit signed integer.
    Byte,
    /// 16-bit signed integer.
    Short,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// Single-precision real.
    Float,
    Boolean,
    Char,
    String,
}

impl Primitive {
    pub fn from_keyword(text: &str) -> Option<Primitive> {
        let primitive = match text {
            "void" => Primitive::Void,
            "byte" => Primitive::Byte,
            "short" => Primitive::Short,
            "integer" => Primitive::Integer,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "boolean" => Primitive::Boolean,
            "char" => Primitive::Char,
            "string" => Primitive::String,
            _ => return None,
        };
        Some(primitive)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Primitive::Void => "void",
            Primitive::Byte => "byte",
            Primitive::Short => "short",
            Primitive::Integer => "integer",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Boolean => "boolean",
            Primitive::Char => "char",
            Primitive::String => "string",
        }
    }

    /// Position in the widening order, or `None` for non-widening types.
    pub fn cast_priority(self) -> Option<u8> {
        match self {
            Primitive::Byte => Some(0),
            Primitive::Short => Some(1),
            Primitive::Char => Some(2),
            Primitive::Integer => Some(3),
            Primitive::Long => Some(4),
            Primitive::Float => Some(5),
            Primitive::Void | Primitive::Boolean | Primitive::String => None,
        }
    }
}

/// An array of `element` values with `dims` dimensions (`integer[,]` has two).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub element: Primitive,
    pub dims: u8,
}

/// Represents the types of values and expressions in ALM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    Primitive(Primitive),
    Array(ArrayType),
    /// The type of an expression that failed to check; silences follow-up errors.
    #[default]
    Undefined,
}

impl Type {
    pub const VOID: Type = Type::Primitive(Primitive::Void);
    pub const BYTE: Type = Type::Primitive(Primitive::Byte);
    pub const SHORT: Type = Type::Primitive(Primitive::Short);
    pub const INTEGER: Type = Type::Primitive(Primitive::Integer);
    pub const LONG: Type = Type::Primitive(Primitive::Long);
    pub const FLOAT: Type = Type::Primitive(Primitive::Float);
    pub const BOOLEAN: Type = Type::Primitive(Primitive::Boolean);
    pub const CHAR: Type = Type::Primitive(Primitive::Char);
    pub const STRING: Type = Type::Primitive(Primitive::String);

    pub fn array(element: Primitive, dims: u8) -> Type {
        Type::Array(ArrayType { element, dims })
    }

    pub fn primitive(self) -> Option<Primitive> {
        match self {
            Type::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_undefined(self) -> bool {
        matches!(self, Type::Undefined)
    }

    pub fn is_void(self) -> bool {
        self == Type::VOID
    }

    pub fn is_array(self) -> bool {
        matches!(self, Type::Array(_))
    }

    /// byte, short, integer, long and float.
    pub fn is_numeric(self) -> bool {
        matches!(
            self.primitive(),
            Some(Primitive::Byte | Primitive::Short | Primitive::Integer | Primitive::Long | Primitive::Float)
        )
    }

    /// byte, short, integer and long.
    pub fn is_integral(self) -> bool {
        matches!(
            self.primitive(),
            Some(Primitive::Byte | Primitive::Short | Primitive::Integer | Primitive::Long)
        )
    }

    pub fn cast_priority(self) -> Option<u8> {
        self.primitive().and_then(Primitive::cast_priority)
    }

    /// True if a value of `self` may be implicitly converted to `target`.
    ///
    /// Identical types are trivially convertible.
    pub fn can_widen_to(self, target: Type) -> bool {
        if self == target {
            return true;
        }
        if target == Type::CHAR {
            return false;
        }
        match (self.cast_priority(), target.cast_priority()) {
            (Some(from), Some(to)) => from <= to,
            _ => false,
        }
    }

    /// The operand type with the higher cast priority.
    pub fn higher(self, other: Type) -> Type {
        match (self.cast_priority(), other.cast_priority()) {
            (Some(a), Some(b)) if b > a => other,
            _ => self,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.keyword()),
            Type::Array(array) => {
                write!(f, "{}[", array.element.keyword())?;
                for _ in 1..array.dims {
                    write!(f, ",")?;
                }
                write!(f, "]")
            }
            Type::Undefined => write!(f, "<undefined>"),
        }
    }
}

/// Parameter type in a function signature.
///
/// `AnyArray` exists only here, to let built-ins such as `length` accept
/// every array; it is never the type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Exact(Type),
    AnyArray,
}

/// How well an argument fits a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArgMatch {
    Exact,
    Widening,
    Mismatch,
}

impl ParamType {
    pub fn accepts(self, arg: Type) -> ArgMatch {
        match self {
            ParamType::Exact(param) if param == arg => ArgMatch::Exact,
            ParamType::Exact(param) if arg.can_widen_to(param) => ArgMatch::Widening,
            ParamType::Exact(_) => ArgMatch::Mismatch,
            ParamType::AnyArray if arg.is_array() => ArgMatch::Exact,
            ParamType::AnyArray => ArgMatch::Mismatch,
        }
    }

    /// The type an argument should be widened to, if any.
    pub fn exact(self) -> Option<Type> {
        match self {
            ParamType::Exact(ty) => Some(ty),
            ParamType::AnyArray => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Exact(ty) => write!(f, "{ty}"),
            ParamType::AnyArray => write!(f, "<any>[]"),
        }
    }
}
