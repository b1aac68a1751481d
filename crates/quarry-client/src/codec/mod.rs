//! Value codec.
//!
//! Encodes call-site [`Value`]s into driver-transportable
//! [`TransportValue`]s and decodes returned columns back into values keyed
//! by [`ColumnKey`]. Encoding is big-endian and fixed-width for scalars;
//! lists carry a 32-bit element count followed by 32-bit length-prefixed
//! elements.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, CodecResult};
use crate::session::{ColumnSpec, ResultSet};
use crate::value::{ColumnKey, Row, Value, ValueType};

/// A typed payload as the driver transports it. `None` data is null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportValue {
    value_type: ValueType,
    data: Option<Bytes>,
}

impl TransportValue {
    /// Creates a transport value from raw parts.
    pub fn new(value_type: ValueType, data: Option<Bytes>) -> Self {
        Self { value_type, data }
    }

    /// Returns the declared type.
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// Returns the payload, `None` for null.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Returns true for null.
    pub fn is_null(&self) -> bool {
        self.data.is_none()
    }
}

/// Encodes one value, inferring its type from its contents.
///
/// Null encodes as a blob-typed null and an empty list as `list<blob>`. Use
/// [`encode_as`] when the parameter type is known.
pub fn encode(value: &Value) -> CodecResult<TransportValue> {
    if value.is_null() {
        return Ok(TransportValue::new(ValueType::Blob, None));
    }
    let value_type = infer(value)?.to_type();
    encode_typed(value, value_type)
}

/// Encodes one value under a declared parameter type.
///
/// The transport always carries `declared`, so nulls and empty lists keep
/// the type the statement was prepared with.
pub fn encode_as(value: &Value, declared: &ValueType) -> CodecResult<TransportValue> {
    if value.is_null() {
        return Ok(TransportValue::new(declared.clone(), None));
    }
    infer(value)?;
    if !declared.accepts(value) {
        return Err(CodecError::TypeMismatch(declared.clone()));
    }
    encode_typed(value, declared.clone())
}

fn encode_typed(value: &Value, value_type: ValueType) -> CodecResult<TransportValue> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf)?;
    Ok(TransportValue::new(value_type, Some(buf.freeze())))
}

/// Type inferred from a value. `Any` is the element of an empty list and
/// merges with every other shape.
#[derive(Debug, Clone)]
enum Shape {
    Any,
    Scalar(ValueType),
    List(Box<Shape>),
}

impl Shape {
    fn merge(&self, other: &Shape) -> Option<Shape> {
        match (self, other) {
            (Shape::Any, shape) | (shape, Shape::Any) => Some(shape.clone()),
            (Shape::Scalar(a), Shape::Scalar(b)) if a == b => Some(self.clone()),
            (Shape::List(a), Shape::List(b)) => a.merge(b).map(|elem| Shape::List(Box::new(elem))),
            _ => None,
        }
    }

    fn to_type(&self) -> ValueType {
        match self {
            Shape::Any => ValueType::Blob,
            Shape::Scalar(value_type) => value_type.clone(),
            Shape::List(elem) => ValueType::List(Box::new(elem.to_type())),
        }
    }
}

/// Infers the shape of a non-null value, checking that list elements agree.
fn infer(value: &Value) -> CodecResult<Shape> {
    let scalar = match value {
        Value::Null => return Err(CodecError::NullInCollection),
        Value::Boolean(_) => ValueType::Boolean,
        Value::Integer(_) => ValueType::BigInt,
        Value::Float(_) => ValueType::Double,
        Value::String(_) => ValueType::Text,
        Value::Bytes(_) => ValueType::Blob,
        Value::List(items) => {
            let mut elem = Shape::Any;
            for item in items {
                let shape = infer(item)?;
                elem = match elem.merge(&shape) {
                    Some(merged) => merged,
                    None => {
                        return Err(CodecError::HeterogeneousList {
                            expected: elem.to_type(),
                            found: shape.to_type(),
                        })
                    }
                };
            }
            return Ok(Shape::List(Box::new(elem)));
        }
    };
    Ok(Shape::Scalar(scalar))
}

fn encode_into(value: &Value, buf: &mut BytesMut) -> CodecResult<()> {
    match value {
        Value::Null => return Err(CodecError::NullInCollection),
        Value::Boolean(b) => buf.put_u8(u8::from(*b)),
        Value::Integer(i) => buf.put_i64(*i),
        Value::Float(f) => buf.put_f64(*f),
        Value::String(s) => {
            check_len(s.len())?;
            buf.put_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            check_len(b.len())?;
            buf.put_slice(b);
        }
        Value::List(items) => {
            buf.put_i32(check_len(items.len())?);
            for item in items {
                let mut elem = BytesMut::new();
                encode_into(item, &mut elem)?;
                buf.put_i32(check_len(elem.len())?);
                buf.put_slice(&elem);
            }
        }
    }
    Ok(())
}

fn check_len(len: usize) -> CodecResult<i32> {
    i32::try_from(len).map_err(|_| CodecError::ValueTooLarge(len))
}

/// Decodes a transport value into a call-site value.
pub fn decode_value(transport: &TransportValue) -> CodecResult<Value> {
    match transport.data() {
        None => Ok(Value::Null),
        Some(data) => decode_payload(transport.value_type(), data.clone()),
    }
}

fn decode_payload(value_type: &ValueType, mut data: Bytes) -> CodecResult<Value> {
    match value_type {
        ValueType::Boolean => {
            expect_width(value_type, &data, 1)?;
            Ok(Value::Boolean(data[0] != 0))
        }
        ValueType::BigInt => {
            expect_width(value_type, &data, 8)?;
            Ok(Value::Integer(data.get_i64()))
        }
        ValueType::Double => {
            expect_width(value_type, &data, 8)?;
            Ok(Value::Float(data.get_f64()))
        }
        ValueType::Text => String::from_utf8(data.to_vec())
            .map(Value::String)
            .map_err(|_| CodecError::InvalidUtf8),
        ValueType::Blob => Ok(Value::Bytes(data.to_vec())),
        ValueType::List(elem_type) => {
            let count = read_len(&mut data, "element count")?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let len = read_len(&mut data, "element length")?;
                if data.remaining() < len {
                    return Err(CodecError::Malformed(format!(
                        "element needs {} bytes, {} left",
                        len,
                        data.remaining()
                    )));
                }
                items.push(decode_payload(elem_type, data.split_to(len))?);
            }
            if data.has_remaining() {
                return Err(CodecError::Malformed(format!(
                    "{} trailing bytes",
                    data.remaining()
                )));
            }
            Ok(Value::List(items))
        }
    }
}

fn expect_width(value_type: &ValueType, data: &Bytes, width: usize) -> CodecResult<()> {
    if data.len() == width {
        Ok(())
    } else {
        Err(CodecError::InvalidLength {
            value_type: value_type.clone(),
            expected: width,
            actual: data.len(),
        })
    }
}

fn read_len(data: &mut Bytes, what: &str) -> CodecResult<usize> {
    if data.remaining() < 4 {
        return Err(CodecError::Malformed(format!("truncated {}", what)));
    }
    let len = data.get_i32();
    usize::try_from(len).map_err(|_| CodecError::Malformed(format!("negative {}", what)))
}

/// Decodes one column into a row entry.
pub fn decode(
    name: &str,
    transport: &TransportValue,
    string_keys: bool,
) -> CodecResult<(ColumnKey, Value)> {
    Ok((ColumnKey::new(name, string_keys), decode_value(transport)?))
}

/// Decodes one returned record.
pub fn decode_row(
    columns: &[ColumnSpec],
    raw: &[TransportValue],
    string_keys: bool,
) -> CodecResult<Row> {
    if columns.len() != raw.len() {
        return Err(CodecError::ColumnCountMismatch {
            expected: columns.len(),
            actual: raw.len(),
        });
    }
    columns
        .iter()
        .zip(raw)
        .map(|(column, value)| decode(column.name(), value, string_keys))
        .collect()
}

/// Decodes every record of a result set, keeping server order.
pub fn decode_rows(result: &ResultSet, string_keys: bool) -> CodecResult<Vec<Row>> {
    result
        .rows()
        .iter()
        .map(|raw| decode_row(result.columns(), raw, string_keys))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let encoded = encode(&value).unwrap();
        assert_eq!(decode_value(&encoded).unwrap(), value);
    }

    #[test]
    fn test_primitive_round_trips() {
        round_trip(Value::Null);
        round_trip(Value::Boolean(true));
        round_trip(Value::Integer(-42));
        round_trip(Value::Float(3.25));
        round_trip(Value::from("héllo"));
        round_trip(Value::Bytes(vec![0, 1, 255]));
        round_trip(Value::List(vec![Value::from("a"), Value::from("b")]));
        round_trip(Value::List(vec![]));
    }

    #[test]
    fn test_integer_encoding_is_big_endian() {
        let encoded = encode(&Value::Integer(1)).unwrap();
        assert_eq!(encoded.value_type(), &ValueType::BigInt);
        assert_eq!(encoded.data().unwrap().as_ref(), &[0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_heterogeneous_list_fails() {
        let err = encode(&Value::List(vec![Value::Integer(1), Value::from("x")])).unwrap_err();
        assert!(matches!(err, CodecError::HeterogeneousList { .. }));
    }

    #[test]
    fn test_nested_list_with_empty_inner() {
        let nested = Value::List(vec![
            Value::List(vec![Value::Integer(1)]),
            Value::List(vec![]),
        ]);
        let list_of_lists =
            ValueType::List(Box::new(ValueType::List(Box::new(ValueType::BigInt))));

        let encoded = encode(&nested).unwrap();
        assert_eq!(encoded.value_type(), &list_of_lists);
        assert_eq!(decode_value(&encoded).unwrap(), nested);

        let reversed = Value::List(vec![
            Value::List(vec![]),
            Value::List(vec![Value::Integer(2), Value::Integer(3)]),
        ]);
        round_trip(reversed);
    }

    #[test]
    fn test_nested_heterogeneous_list_fails() {
        let nested = Value::List(vec![
            Value::List(vec![Value::Integer(1)]),
            Value::List(vec![Value::from("x")]),
        ]);
        assert!(matches!(
            encode(&nested),
            Err(CodecError::HeterogeneousList { .. })
        ));
    }

    #[test]
    fn test_encode_as_keeps_declared_type() {
        let ints = ValueType::List(Box::new(ValueType::BigInt));

        let null = encode_as(&Value::Null, &ValueType::Text).unwrap();
        assert!(null.is_null());
        assert_eq!(null.value_type(), &ValueType::Text);

        let empty = encode_as(&Value::List(vec![]), &ints).unwrap();
        assert_eq!(empty.value_type(), &ints);
        assert_eq!(decode_value(&empty).unwrap(), Value::List(vec![]));

        assert_eq!(
            encode_as(&Value::Integer(7), &ValueType::BigInt).unwrap(),
            encode(&Value::Integer(7)).unwrap()
        );
    }

    #[test]
    fn test_encode_as_rejects_mismatch() {
        assert!(matches!(
            encode_as(&Value::from("x"), &ValueType::BigInt),
            Err(CodecError::TypeMismatch(ValueType::BigInt))
        ));
        assert!(matches!(
            encode_as(&Value::List(vec![Value::Integer(1), Value::Null]), &ValueType::Blob),
            Err(CodecError::NullInCollection)
        ));
    }

    #[test]
    fn test_null_in_list_fails() {
        let err = encode(&Value::List(vec![Value::Integer(1), Value::Null])).unwrap_err();
        assert!(matches!(err, CodecError::NullInCollection));
    }

    #[test]
    fn test_bad_width_fails() {
        let transport = TransportValue::new(ValueType::BigInt, Some(Bytes::from_static(&[1, 2])));
        assert!(matches!(
            decode_value(&transport),
            Err(CodecError::InvalidLength { expected: 8, actual: 2, .. })
        ));
    }

    #[test]
    fn test_truncated_list_fails() {
        let transport = TransportValue::new(
            ValueType::List(Box::new(ValueType::BigInt)),
            Some(Bytes::from_static(&[0, 0, 0, 2, 0, 0, 0, 8, 0, 0])),
        );
        assert!(matches!(decode_value(&transport), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_decode_key_modes() {
        let transport = encode(&Value::Integer(5)).unwrap();

        let (key, value) = decode("id", &transport, false).unwrap();
        assert!(matches!(key, ColumnKey::Symbol(_)));
        assert_eq!(value, Value::Integer(5));

        let (key, _) = decode("id", &transport, true).unwrap();
        assert_eq!(key, ColumnKey::Name("id".to_string()));
    }

    #[test]
    fn test_decode_row_checks_width() {
        let columns = vec![
            ColumnSpec::new("id", ValueType::BigInt),
            ColumnSpec::new("name", ValueType::Text),
        ];
        let raw = vec![encode(&Value::Integer(1)).unwrap()];
        assert!(matches!(
            decode_row(&columns, &raw, true),
            Err(CodecError::ColumnCountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_decode_rows_keeps_order() {
        let columns = vec![ColumnSpec::new("x", ValueType::BigInt)];
        let rows = (0..3)
            .rev()
            .map(|i| vec![encode(&Value::Integer(i)).unwrap()])
            .collect();
        let result = ResultSet::new(columns, rows);

        let decoded = decode_rows(&result, true).unwrap();
        let xs: Vec<_> = decoded.iter().map(|r| r.get_as::<i64>("x").unwrap()).collect();
        assert_eq!(xs, vec![2, 1, 0]);
    }
}
