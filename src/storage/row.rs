//! Row values and the row codec: packing/unpacking a logical row into the
//! fixed-width bytes that live inside a leaf cell's payload.
use crate::errors::Error;
use crate::storage::schema::{ColumnType, Schema, TEXT_SIZE};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Double(f64),
    Text(String),
}

impl Value {
    pub fn col_type(&self) -> ColumnType {
        match self {
            Value::Int(_) => ColumnType::Int,
            Value::Double(_) => ColumnType::Double,
            Value::Text(_) => ColumnType::Text,
        }
    }

    /// The typed zero/empty default used for columns absent from an INSERT.
    pub fn default_for(t: ColumnType) -> Value {
        match t {
            ColumnType::Int => Value::Int(0),
            ColumnType::Double => Value::Double(0.0),
            ColumnType::Text => Value::Text(String::new()),
        }
    }

    /// Parses a literal SQL value string into a typed value, per the
    /// column's declared type.
    pub fn parse(t: ColumnType, literal: &str) -> Result<Value, Error> {
        match t {
            ColumnType::Int => literal
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| err!(Schema, "invalid INT literal: {}", literal)),
            ColumnType::Double => literal
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| err!(Schema, "invalid DOUBLE literal: {}", literal)),
            ColumnType::Text => {
                if literal.len() > TEXT_SIZE {
                    return Err(err!(
                        Schema,
                        "text value exceeds max length: {} > {}",
                        literal.len(),
                        TEXT_SIZE
                    ));
                }
                Ok(Value::Text(literal.to_string()))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

/// A logical row: one value per schema column, `values[0]` being the
/// primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn id(&self) -> Result<u32, Error> {
        match self.values.first() {
            Some(Value::Int(v)) if *v >= 0 => Ok(*v as u32),
            Some(Value::Int(v)) => Err(err!(Schema, "negative id: {}", v)),
            _ => Err(err!(Schema, "row has no valid primary key value")),
        }
    }

    pub fn get(&self, schema: &Schema, column: &str) -> Option<&Value> {
        schema
            .column_index(column)
            .and_then(|i| self.values.get(i))
    }
}

/// Builds a row from a partial column/value list plus a schema: columns
/// named in `columns` take the parsed value from `values` at the same
/// index, all other columns get their typed default.
pub fn build_row(schema: &Schema, columns: &[String], values: &[String]) -> Result<Row, Error> {
    if columns.len() != values.len() {
        return Err(err!(
            Schema,
            "column list ({}) and value list ({}) differ in length",
            columns.len(),
            values.len()
        ));
    }

    let mut out = Vec::with_capacity(schema.columns.len());
    for col in &schema.columns {
        let provided = columns
            .iter()
            .position(|c| c == &col.name)
            .map(|idx| &values[idx]);

        let value = match provided {
            Some(literal) => Value::parse(col.col_type, literal)?,
            None => Value::default_for(col.col_type),
        };
        out.push(value);
    }
    Ok(Row { values: out })
}

/// Serializes `row` into `dst`, which must be exactly `schema.row_size`
/// bytes. Each column is written in schema order: `INT` little-endian
/// 4 bytes, `DOUBLE` little-endian 8 bytes, `TEXT` as a NUL-padded
/// 255-byte slot so that cell strides stay fixed regardless of content length.
pub fn serialize(schema: &Schema, row: &Row, dst: &mut [u8]) -> Result<(), Error> {
    if dst.len() != schema.row_size as usize {
        return Err(err!(
            Schema,
            "row buffer is {} bytes, schema row_size is {}",
            dst.len(),
            schema.row_size
        ));
    }
    if row.values.len() != schema.columns.len() {
        return Err(err!(
            Schema,
            "row has {} values, schema has {} columns",
            row.values.len(),
            schema.columns.len()
        ));
    }

    let mut offset = 0;
    for (col, value) in schema.columns.iter().zip(row.values.iter()) {
        let width = col.col_type.fixed_size();
        let slot = &mut dst[offset..offset + width];
        match (col.col_type, value) {
            (ColumnType::Int, Value::Int(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (ColumnType::Double, Value::Double(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (ColumnType::Text, Value::Text(s)) => {
                if s.len() > width {
                    return Err(err!(
                        Schema,
                        "text value for column '{}' exceeds slot width: {} > {}",
                        col.name,
                        s.len(),
                        width
                    ));
                }
                slot.fill(0);
                slot[..s.len()].copy_from_slice(s.as_bytes());
            }
            _ => {
                return Err(err!(
                    Schema,
                    "value type mismatch for column '{}': expected {}",
                    col.name,
                    col.col_type
                ))
            }
        }
        offset += width;
    }
    Ok(())
}

/// Inverse of `serialize`: allocates a fresh `Row` owning its own values.
pub fn deserialize(schema: &Schema, src: &[u8]) -> Result<Row, Error> {
    if src.len() != schema.row_size as usize {
        return Err(err!(
            Schema,
            "row buffer is {} bytes, schema row_size is {}",
            src.len(),
            schema.row_size
        ));
    }

    let mut values = Vec::with_capacity(schema.columns.len());
    let mut offset = 0;
    for col in &schema.columns {
        let width = col.col_type.fixed_size();
        let slot = &src[offset..offset + width];
        let value = match col.col_type {
            ColumnType::Int => Value::Int(i32::from_le_bytes(slot.try_into().unwrap())),
            ColumnType::Double => Value::Double(f64::from_le_bytes(slot.try_into().unwrap())),
            ColumnType::Text => {
                let nul = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
                Value::Text(String::from_utf8_lossy(&slot[..nul]).into_owned())
            }
        };
        values.push(value);
        offset += width;
    }
    Ok(Row { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::Column;

    fn schema() -> Schema {
        Schema::new(
            "users".into(),
            vec![
                Column {
                    name: "id".into(),
                    col_type: ColumnType::Int,
                },
                Column {
                    name: "score".into(),
                    col_type: ColumnType::Double,
                },
                Column {
                    name: "name".into(),
                    col_type: ColumnType::Text,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn round_trip_is_identity() {
        let schema = schema();
        let row = Row {
            values: vec![
                Value::Int(7),
                Value::Double(3.5),
                Value::Text("alice".into()),
            ],
        };
        let mut buf = vec![0u8; schema.row_size as usize];
        serialize(&schema, &row, &mut buf).unwrap();
        let back = deserialize(&schema, &buf).unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn build_row_fills_typed_defaults_for_missing_columns() {
        let schema = schema();
        let row = build_row(&schema, &["id".to_string()], &["42".to_string()]).unwrap();
        assert_eq!(row.values[0], Value::Int(42));
        assert_eq!(row.values[1], Value::Double(0.0));
        assert_eq!(row.values[2], Value::Text(String::new()));
    }

    #[test]
    fn text_round_trips_through_nul_padded_slot() {
        let schema = schema();
        let row = Row {
            values: vec![Value::Int(1), Value::Double(0.0), Value::Text("".into())],
        };
        let mut buf = vec![0u8; schema.row_size as usize];
        serialize(&schema, &row, &mut buf).unwrap();
        let back = deserialize(&schema, &buf).unwrap();
        assert_eq!(back.values[2], Value::Text(String::new()));
    }

    #[test]
    fn accepts_text_value_at_the_width_limit_with_no_terminator() {
        let exact = "x".repeat(TEXT_SIZE);
        let value = Value::parse(ColumnType::Text, &exact).unwrap();
        assert_eq!(value, Value::Text(exact.clone()));

        let schema = schema();
        let row = Row {
            values: vec![Value::Int(1), Value::Double(0.0), value],
        };
        let mut buf = vec![0u8; schema.row_size as usize];
        serialize(&schema, &row, &mut buf).unwrap();
        let back = deserialize(&schema, &buf).unwrap();
        assert_eq!(back.values[2], Value::Text(exact));
    }

    #[test]
    fn rejects_text_value_past_the_width_limit() {
        let too_long = "x".repeat(TEXT_SIZE + 1);
        assert!(Value::parse(ColumnType::Text, &too_long).is_err());
    }
}
