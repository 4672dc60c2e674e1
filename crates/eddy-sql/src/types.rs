//! Mapping between SQL column types and Arrow data types.

use std::sync::Arc;

use arrow_schema::{DataType, Field, TimeUnit};
use sqlparser::ast::{ArrayElemTypeDef, DataType as SqlDataType, ExactNumberInfo};

use crate::parser::ParseError;

/// Converts a SQL data type to an Arrow data type.
///
/// # Errors
///
/// Returns `ParseError::SyntaxError` for types with no Arrow counterpart here.
pub fn sql_type_to_arrow(sql_type: &SqlDataType) -> Result<DataType, ParseError> {
    match sql_type {
        SqlDataType::TinyInt(_) => Ok(DataType::Int8),
        SqlDataType::SmallInt(_) => Ok(DataType::Int16),
        SqlDataType::Int(_) | SqlDataType::Integer(_) => Ok(DataType::Int32),
        SqlDataType::BigInt(_) => Ok(DataType::Int64),

        SqlDataType::Float(_) | SqlDataType::Real => Ok(DataType::Float32),
        SqlDataType::Double(_) | SqlDataType::DoublePrecision => Ok(DataType::Float64),

        SqlDataType::Decimal(info) | SqlDataType::Numeric(info) => {
            #[allow(clippy::cast_possible_truncation)]
            let (precision, scale) = match info {
                ExactNumberInfo::PrecisionAndScale(p, s) => (*p as u8, *s as i8),
                ExactNumberInfo::Precision(p) => (*p as u8, 0),
                ExactNumberInfo::None => (38, 9),
            };
            Ok(DataType::Decimal128(precision, scale))
        }

        SqlDataType::Char(_)
        | SqlDataType::Character(_)
        | SqlDataType::Varchar(_)
        | SqlDataType::CharacterVarying(_)
        | SqlDataType::Text
        | SqlDataType::String(_) => Ok(DataType::Utf8),

        SqlDataType::Boolean | SqlDataType::Bool => Ok(DataType::Boolean),

        SqlDataType::Date => Ok(DataType::Date32),
        SqlDataType::Timestamp(_, _) => Ok(DataType::Timestamp(TimeUnit::Millisecond, None)),

        SqlDataType::Array(
            ArrayElemTypeDef::AngleBracket(inner) | ArrayElemTypeDef::SquareBracket(inner, _),
        ) => {
            let element = sql_type_to_arrow(inner)?;
            Ok(DataType::List(Arc::new(Field::new("item", element, true))))
        }

        _ => Err(ParseError::SyntaxError(format!(
            "Unsupported column type: {sql_type}"
        ))),
    }
}

/// Renders an Arrow data type as the SQL type name used in statements.
#[must_use]
pub fn arrow_type_to_sql(data_type: &DataType) -> String {
    match data_type {
        DataType::Int8 => "TINYINT".to_string(),
        DataType::Int16 => "SMALLINT".to_string(),
        DataType::Int32 => "INTEGER".to_string(),
        DataType::Int64 => "BIGINT".to_string(),
        DataType::Float32 => "FLOAT".to_string(),
        DataType::Float64 => "DOUBLE".to_string(),
        DataType::Decimal128(p, s) => format!("DECIMAL({p}, {s})"),
        DataType::Utf8 | DataType::LargeUtf8 => "VARCHAR".to_string(),
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Date32 => "DATE".to_string(),
        DataType::Timestamp(_, _) => "TIMESTAMP".to_string(),
        DataType::List(field) => format!("ARRAY<{}>", arrow_type_to_sql(field.data_type())),
        other => other.to_string().to_ascii_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse_type(sql: &str) -> SqlDataType {
        let dialect = GenericDialect {};
        Parser::new(&dialect)
            .try_with_sql(sql)
            .unwrap()
            .parse_data_type()
            .unwrap()
    }

    #[test]
    fn test_scalar_types() {
        assert_eq!(sql_type_to_arrow(&parse_type("BIGINT")).unwrap(), DataType::Int64);
        assert_eq!(sql_type_to_arrow(&parse_type("INTEGER")).unwrap(), DataType::Int32);
        assert_eq!(sql_type_to_arrow(&parse_type("VARCHAR")).unwrap(), DataType::Utf8);
        assert_eq!(sql_type_to_arrow(&parse_type("STRING")).unwrap(), DataType::Utf8);
        assert_eq!(sql_type_to_arrow(&parse_type("DOUBLE")).unwrap(), DataType::Float64);
        assert_eq!(sql_type_to_arrow(&parse_type("BOOLEAN")).unwrap(), DataType::Boolean);
    }

    #[test]
    fn test_render_array_type() {
        let arrow = DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)));
        assert_eq!(arrow_type_to_sql(&arrow), "ARRAY<VARCHAR>");
    }

    #[test]
    fn test_render_names() {
        assert_eq!(arrow_type_to_sql(&DataType::Int32), "INTEGER");
        assert_eq!(arrow_type_to_sql(&DataType::Int64), "BIGINT");
        assert_eq!(arrow_type_to_sql(&DataType::Utf8), "VARCHAR");
        assert_eq!(arrow_type_to_sql(&DataType::Float64), "DOUBLE");
    }
}
