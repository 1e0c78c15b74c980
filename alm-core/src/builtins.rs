//! Built-in functions visible in every compilation unit.
//!
//! These are seeded into the global scope before any user declaration is
//! registered, so user functions with the same signature are reported as
//! duplicates. Backends map them to runtime routines by name and
//! signature; nothing here performs I/O.

use crate::types::{ParamType, Type};

/// Metadata about a single builtin function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Name at the language level (e.g., `println`).
    pub name: &'static str,
    pub params: &'static [ParamType],
    pub ret: Type,
}

const fn exact(ty: Type) -> ParamType {
    ParamType::Exact(ty)
}

macro_rules! overloads {
    ($name:literal -> $ret:expr; $($param:expr),+ $(,)?) => {
        [$(BuiltinDescriptor { name: $name, params: &[exact($param)], ret: $ret }),+]
    };
}

const PRINT: [BuiltinDescriptor; 6] = overloads!("print" -> Type::VOID;
    Type::STRING, Type::INTEGER, Type::LONG, Type::FLOAT, Type::CHAR, Type::BOOLEAN);
const PRINTLN: [BuiltinDescriptor; 6] = overloads!("println" -> Type::VOID;
    Type::STRING, Type::INTEGER, Type::LONG, Type::FLOAT, Type::CHAR, Type::BOOLEAN);
const TO_STRING: [BuiltinDescriptor; 5] = overloads!("toString" -> Type::STRING;
    Type::INTEGER, Type::LONG, Type::FLOAT, Type::CHAR, Type::BOOLEAN);

const OTHERS: [BuiltinDescriptor; 5] = [
    BuiltinDescriptor {
        name: "input",
        params: &[],
        ret: Type::STRING,
    },
    BuiltinDescriptor {
        name: "length",
        params: &[ParamType::AnyArray],
        ret: Type::INTEGER,
    },
    BuiltinDescriptor {
        name: "toInteger",
        params: &[exact(Type::FLOAT)],
        ret: Type::INTEGER,
    },
    BuiltinDescriptor {
        name: "toFloat",
        params: &[exact(Type::STRING)],
        ret: Type::FLOAT,
    },
    BuiltinDescriptor {
        name: "parseInteger",
        params: &[exact(Type::STRING)],
        ret: Type::INTEGER,
    },
];

/// The complete list of builtins, in registration order.
pub fn builtins() -> impl Iterator<Item = &'static BuiltinDescriptor> {
    const ALL: &[&[BuiltinDescriptor]] = &[&PRINT, &PRINTLN, &TO_STRING, &OTHERS];
    ALL.iter().flat_map(|group| group.iter())
}

/// Look up every builtin overload with the given name.
pub fn find_builtins(name: &str) -> Vec<&'static BuiltinDescriptor> {
    builtins().filter(|b| b.name == name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_has_one_overload_per_printable_type() {
        let prints = find_builtins("print");
        assert_eq!(prints.len(), 6);
        assert!(prints.iter().all(|b| b.ret == Type::VOID && b.params.len() == 1));
    }

    #[test]
    fn length_accepts_any_array() {
        let length = find_builtins("length");
        assert_eq!(length.len(), 1);
        assert_eq!(length[0].params, &[ParamType::AnyArray]);
        assert!(find_builtins("missing").is_empty());
    }
}
