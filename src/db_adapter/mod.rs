use sqlx::{
    Arguments, Column, ColumnIndex, Database, Decode, Encode, Row, TypeInfo, ValueRef,
    error::BoxDynError, prelude::Type,
};

use crate::{
    Error, Param, Params, Value,
    placeholder::{Segment, parse},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DBType {
    PostgreSQL,
    MySQL,
    SQLite,
    Unknown,
}

impl From<&str> for DBType {
    fn from(value: &str) -> Self {
        match value {
            "PostgreSQL" => Self::PostgreSQL,
            "MySQL" => Self::MySQL,
            "SQLite" => Self::SQLite,
            _ => Self::Unknown,
        }
    }
}

fn dollar_placeholder(i: usize, s: &mut String) {
    s.push('$');
    s.push_str(&i.to_string());
}

fn question_placeholder(_: usize, s: &mut String) {
    s.push('?');
}

impl DBType {
    pub fn of<DB: Database>() -> Self {
        Self::from(DB::NAME)
    }

    /// Placeholder writer for this backend, `None` when the driver's own
    /// `Arguments::format_placeholder` should be used.
    ///
    /// Needed for `Any` connections, whose arguments always format `?`.
    pub fn encode_placeholder_fn(self) -> Option<fn(usize, &mut String)> {
        let f: fn(usize, &mut String) = match self {
            Self::PostgreSQL => dollar_placeholder,
            Self::MySQL | Self::SQLite => question_placeholder,
            Self::Unknown => return None,
        };
        Some(f)
    }
}

/// Databases able to bind every [`Value`] variant.
pub trait BindValue<'q>: Database {
    fn bind_value(
        arguments: &mut <Self as Database>::Arguments<'q>,
        value: Value,
    ) -> Result<(), BoxDynError>;
}

impl<'q, DB> BindValue<'q> for DB
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
    Vec<u8>: Encode<'q, DB> + Type<DB>,
{
    fn bind_value(arguments: &mut DB::Arguments<'q>, value: Value) -> Result<(), BoxDynError> {
        match value {
            Value::Null => arguments.add(None::<String>),
            Value::Bool(v) => arguments.add(v),
            Value::Int(v) => arguments.add(v),
            Value::Float(v) => arguments.add(v),
            Value::Text(v) => arguments.add(v),
            Value::Bytes(v) => arguments.add(v),
        }
    }
}

/// Databases whose columns can be read back as [`Value`]s.
///
/// Columns are tried as integer, float, text, bytes and boolean in that
/// order. Anything else comes back as the driver's raw bytes when it will
/// hand them out, otherwise as a decode error naming the column type.
pub trait DecodeValue: Database {
    fn decode_value(row: &Self::Row, index: usize) -> Result<Value, sqlx::Error>;
}

impl<DB> DecodeValue for DB
where
    DB: Database,
    usize: ColumnIndex<DB::Row>,
    bool: Type<DB> + for<'r> Decode<'r, DB>,
    i32: Type<DB> + for<'r> Decode<'r, DB>,
    i64: Type<DB> + for<'r> Decode<'r, DB>,
    f32: Type<DB> + for<'r> Decode<'r, DB>,
    f64: Type<DB> + for<'r> Decode<'r, DB>,
    String: Type<DB> + for<'r> Decode<'r, DB>,
    Vec<u8>: Type<DB> + for<'r> Decode<'r, DB>,
{
    fn decode_value(row: &DB::Row, index: usize) -> Result<Value, sqlx::Error> {
        // try_get rejects incompatible column types before decoding
        if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            return Ok(v.into());
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
            return Ok(v.into());
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            return Ok(v.into());
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
            return Ok(v.into());
        }
        // text before bytes, some drivers accept text columns as bytes
        if let Ok(v) = row.try_get::<Option<String>, _>(index) {
            return Ok(v.into());
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
            return Ok(v.into());
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
            return Ok(v.into());
        }
        if let Ok(v) = row.try_get_unchecked::<Option<Vec<u8>>, _>(index) {
            return Ok(v.into());
        }
        let column = &row.columns()[index];
        let value_type = row.try_get_raw(index)?.type_info().name().to_string();
        Err(sqlx::Error::Decode(
            format!(
                "column {} has unsupported type {} (declared {})",
                column.name(),
                value_type,
                column.type_info().name()
            )
            .into(),
        ))
    }
}

/// One result row as ordered column name to value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMap(Vec<(String, Value)>);

impl RowMap {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<(String, Value)> {
        self.0
    }
}

pub fn row_to_map<DB: DecodeValue>(row: &DB::Row) -> Result<RowMap, sqlx::Error> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        values.push((column.name().to_string(), DB::decode_value(row, i)?));
    }
    Ok(RowMap(values))
}

/// Turns an expanded template into driver SQL, binding each placeholder's
/// value in order of appearance. `%%` becomes `%`.
pub fn bind_template<'q, DB>(
    sql: &str,
    params: &Params,
    f: Option<fn(usize, &mut String)>,
) -> Result<(String, Option<DB::Arguments<'q>>), Error>
where
    DB: BindValue<'q>,
{
    let mut arguments: DB::Arguments<'q> = Default::default();
    let mut out = String::with_capacity(sql.len());
    for segment in parse(sql)? {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Percent => out.push('%'),
            Segment::Placeholder(key) => match params.get(key) {
                Some(Param::Scalar(value)) => {
                    DB::bind_value(&mut arguments, value.clone()).map_err(sqlx::Error::Encode)?;
                    if let Some(f) = f {
                        f(arguments.len(), &mut out);
                    } else {
                        arguments.format_placeholder(&mut out)?;
                    }
                }
                Some(Param::List(_)) => return Err(Error::UnflattenedList(key.to_string())),
                None => return Err(Error::MissingParameter(key.to_string())),
            },
        }
    }
    if arguments.len() == 0 {
        return Ok((out, None));
    }
    Ok((out, Some(arguments)))
}
