//! Call-site values, column keys and decoded rows.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

/// Column types understood by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// One-byte boolean.
    Boolean,
    /// 64-bit signed integer.
    BigInt,
    /// 64-bit float.
    Double,
    /// UTF-8 text.
    Text,
    /// Opaque bytes.
    Blob,
    /// Homogeneous list.
    List(Box<ValueType>),
}

impl ValueType {
    /// Returns true if `value` may be bound to a parameter of this type.
    ///
    /// Null is accepted everywhere. An empty list is accepted by any list
    /// type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ValueType::Boolean, Value::Boolean(_))
            | (ValueType::BigInt, Value::Integer(_))
            | (ValueType::Double, Value::Float(_))
            | (ValueType::Text, Value::String(_))
            | (ValueType::Blob, Value::Bytes(_)) => true,
            (ValueType::List(elem), Value::List(items)) => {
                items.iter().all(|item| !item.is_null() && elem.accepts(item))
            }
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::BigInt => write!(f, "bigint"),
            ValueType::Double => write!(f, "double"),
            ValueType::Text => write!(f, "text"),
            ValueType::Blob => write!(f, "blob"),
            ValueType::List(elem) => write!(f, "list<{}>", elem),
        }
    }
}

/// Value types supported at the call site.
///
/// Equality and hashing are structural; floats compare by bit pattern so
/// values can live inside cache keys.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Ordered collection; elements share one type and are never null.
    List(Vec<Value>),
}

impl Value {
    /// Returns true if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the column type of this value, `None` for null.
    ///
    /// An empty list reports `list<blob>`; it binds to any list type.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ValueType::Boolean),
            Value::Integer(_) => Some(ValueType::BigInt),
            Value::Float(_) => Some(ValueType::Double),
            Value::String(_) => Some(ValueType::Text),
            Value::Bytes(_) => Some(ValueType::Blob),
            Value::List(items) => {
                let elem = items
                    .first()
                    .and_then(Value::value_type)
                    .unwrap_or(ValueType::Blob);
                Some(ValueType::List(Box::new(elem)))
            }
        }
    }

    /// Tries to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Tries to get as integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Tries to get as float. Integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Tries to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Tries to get as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Tries to get as a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::List(items) => items.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// Trait for converting from Value.
pub trait FromValue: Sized {
    /// Converts from a Value.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(|s| s.to_string())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(|b| b.to_vec())
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

fn symbol_table() -> &'static DashMap<Box<str>, Arc<str>> {
    static SYMBOLS: OnceLock<DashMap<Box<str>, Arc<str>>> = OnceLock::new();
    SYMBOLS.get_or_init(DashMap::new)
}

/// An interned column name.
///
/// Interning the same name twice yields symbols sharing one allocation, so
/// rows decoded with symbolic keys do not repeat column names per row.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Interns `name` in the process-wide symbol table.
    pub fn intern(name: &str) -> Self {
        if let Some(existing) = symbol_table().get(name) {
            return Symbol(Arc::clone(existing.value()));
        }
        let entry = symbol_table()
            .entry(name.into())
            .or_insert_with(|| Arc::from(name));
        Symbol(Arc::clone(entry.value()))
    }

    /// Returns the symbol name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if both symbols share one interned allocation.
    pub fn ptr_eq(&self, other: &Symbol) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The key of one column in a decoded [`Row`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnKey {
    /// Interned symbolic key (the default).
    Symbol(Symbol),
    /// Plain string key, selected with `string_keys`.
    Name(String),
}

impl ColumnKey {
    /// Builds a key in the requested representation.
    pub fn new(name: &str, string_keys: bool) -> Self {
        if string_keys {
            ColumnKey::Name(name.to_string())
        } else {
            ColumnKey::Symbol(Symbol::intern(name))
        }
    }

    /// Returns the column name regardless of representation.
    pub fn as_str(&self) -> &str {
        match self {
            ColumnKey::Symbol(sym) => sym.as_str(),
            ColumnKey::Name(name) => name,
        }
    }

    /// Returns true for string keys.
    pub fn is_string(&self) -> bool {
        matches!(self, ColumnKey::Name(_))
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded result record, columns in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(ColumnKey, Value)>,
}

impl Row {
    /// Creates a row from key-value pairs.
    pub fn new(columns: Vec<(ColumnKey, Value)>) -> Self {
        Self { columns }
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Looks up a column by name, whatever the key representation.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(_, value)| value)
    }

    /// Looks up a column and converts it.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(T::from_value)
    }

    /// Iterates over columns in order.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnKey, &Value)> {
        self.columns.iter().map(|(k, v)| (k, v))
    }

    /// Iterates over column keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.columns.iter().map(|(k, _)| k)
    }

    /// Consumes the row into its key-value pairs.
    pub fn into_inner(self) -> Vec<(ColumnKey, Value)> {
        self.columns
    }
}

impl FromIterator<(ColumnKey, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (ColumnKey, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
