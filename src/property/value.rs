use std::fmt;
use std::path::{Path, PathBuf};

/// A dynamically typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Path(PathBuf),
    List(Vec<Value>),
}

/// The runtime kind of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Bool,
    Int,
    Str,
    Path,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Str => "str",
            ValueKind::Path => "path",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Str(_) => ValueKind::Str,
            Value::Path(_) => ValueKind::Path,
            Value::List(_) => ValueKind::List,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => f.write_str(s),
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Value::Path(value)
    }
}

impl From<&Path> for Value {
    fn from(value: &Path) -> Self {
        Value::Path(value.to_path_buf())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

/// Statically declared type of a property.
///
/// A union lists its accepted types in order of preference: assignment tries each member in
/// turn and the first one that accepts the value decides how it is stored.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Any,
    Bool,
    Int,
    Str,
    Path,
    List(Box<TypeDescriptor>),
    Optional(Box<TypeDescriptor>),
    Union(Vec<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn list(inner: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(inner))
    }

    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(inner))
    }

    pub fn union(members: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        TypeDescriptor::Union(members.into_iter().collect())
    }

    /// Convert `value` into the representation this type stores, or explain why it can't.
    pub fn adapt(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (TypeDescriptor::Any, value) => Ok(value),
            (TypeDescriptor::Bool, value @ Value::Bool(_)) => Ok(value),
            (TypeDescriptor::Int, value @ Value::Int(_)) => Ok(value),
            (TypeDescriptor::Str, value @ Value::Str(_)) => Ok(value),
            (TypeDescriptor::Path, value @ Value::Path(_)) => Ok(value),
            (TypeDescriptor::Path, Value::Str(text)) => Ok(Value::Path(PathBuf::from(text))),
            (TypeDescriptor::List(inner), Value::List(items)) => items
                .into_iter()
                .map(|item| inner.adapt(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (TypeDescriptor::Optional(_), Value::None) => Ok(Value::None),
            (TypeDescriptor::Optional(inner), value) => inner.adapt(value),
            (TypeDescriptor::Union(members), value) => {
                let mut errors = Vec::new();
                for member in members {
                    match member.adapt(value.clone()) {
                        Ok(adapted) => return Ok(adapted),
                        Err(err) => errors.push(err),
                    }
                }
                Err(errors.join("\n"))
            }
            (expected, value) => Err(format!("expected {expected}, got {}", value.kind())),
        }
    }

    /// Whether a property of this type may provide a value of `kind`, either directly or as
    /// elements of a sequence.
    pub fn provides(&self, kind: ValueKind) -> bool {
        match self {
            TypeDescriptor::Any => true,
            TypeDescriptor::Bool => kind == ValueKind::Bool,
            TypeDescriptor::Int => kind == ValueKind::Int,
            TypeDescriptor::Str => kind == ValueKind::Str,
            TypeDescriptor::Path => kind == ValueKind::Path,
            TypeDescriptor::List(inner) => kind == ValueKind::List || inner.provides(kind),
            TypeDescriptor::Optional(inner) => kind == ValueKind::None || inner.provides(kind),
            TypeDescriptor::Union(members) => members.iter().any(|m| m.provides(kind)),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Any => f.write_str("any"),
            TypeDescriptor::Bool => f.write_str("bool"),
            TypeDescriptor::Int => f.write_str("int"),
            TypeDescriptor::Str => f.write_str("str"),
            TypeDescriptor::Path => f.write_str("path"),
            TypeDescriptor::List(inner) => write!(f, "list[{inner}]"),
            TypeDescriptor::Optional(inner) => write!(f, "optional[{inner}]"),
            TypeDescriptor::Union(members) => {
                for (idx, member) in members.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}
