use colops_proto::sse;
use prost::Message;
use thiserror::Error;

/// Classification of a registered function, as declared in the catalogue.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FunctionKind {
    Scalar,
    Aggregation,
    Tensor,
}

impl FunctionKind {
    pub fn code(self) -> i32 {
        match self {
            FunctionKind::Scalar => 0,
            FunctionKind::Aggregation => 1,
            FunctionKind::Tensor => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FunctionKind::Scalar),
            1 => Some(FunctionKind::Aggregation),
            2 => Some(FunctionKind::Tensor),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FunctionKind::Scalar => "SCALAR",
            FunctionKind::Aggregation => "AGGREGATION",
            FunctionKind::Tensor => "TENSOR",
        }
    }
}

/// Primitive type of a parameter, return value or table field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ParamType {
    String,
    Numeric,
    Dual,
}

impl ParamType {
    pub fn code(self) -> i32 {
        match self {
            ParamType::String => 0,
            ParamType::Numeric => 1,
            ParamType::Dual => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ParamType::String),
            1 => Some(ParamType::Numeric),
            2 => Some(ParamType::Dual),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
}

/// Declarative description of one registered function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub id: i32,
    pub name: String,
    pub kind: FunctionKind,
    /// Parameters in declaration order (sorted by name when loaded from the catalogue).
    pub params: Vec<Param>,
    pub return_type: ParamType,
}

impl From<&FunctionDescriptor> for sse::FunctionDefinition {
    fn from(desc: &FunctionDescriptor) -> Self {
        sse::FunctionDefinition {
            name: desc.name.clone(),
            function_type: desc.kind.code(),
            return_type: desc.return_type.code(),
            params: desc
                .params
                .iter()
                .map(|p| sse::Parameter {
                    data_type: p.ty.code(),
                    name: p.name.clone(),
                })
                .collect(),
            function_id: desc.id,
        }
    }
}

//
// Row data
//

/// A single cell: numeric, string, or both.
#[derive(Clone, Debug, PartialEq)]
pub enum Dual {
    Num(f64),
    Str(String),
    Both(f64, String),
}

impl Dual {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Dual::Num(n) | Dual::Both(n, _) => Some(*n),
            Dual::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dual::Str(s) | Dual::Both(_, s) => Some(s),
            Dual::Num(_) => None,
        }
    }

    /// String view of the cell. An empty string travels as a numeric-only
    /// cell, so that reads as `""`.
    pub fn text(&self) -> &str {
        self.as_str().unwrap_or_default()
    }
}

// An empty string marks a numeric cell and a NaN number marks a string cell;
// anything else carries both representations.
impl From<sse::Dual> for Dual {
    fn from(d: sse::Dual) -> Self {
        if d.str_data.is_empty() {
            Dual::Num(d.num_data)
        } else if d.num_data.is_nan() {
            Dual::Str(d.str_data)
        } else {
            Dual::Both(d.num_data, d.str_data)
        }
    }
}

impl From<Dual> for sse::Dual {
    fn from(d: Dual) -> Self {
        match d {
            Dual::Num(n) => sse::Dual {
                num_data: n,
                str_data: String::new(),
            },
            Dual::Str(s) => sse::Dual {
                num_data: f64::NAN,
                str_data: s,
            },
            Dual::Both(n, s) => sse::Dual {
                num_data: n,
                str_data: s,
            },
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("expected {expected} column(s), got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("column {column} is not {expected}")]
    Type { column: usize, expected: &'static str },
}

/// One row of an invocation; width equals the invoked function's arity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(pub Vec<Dual>);

impl Row {
    pub fn num(values: impl IntoIterator<Item = f64>) -> Self {
        Row(values.into_iter().map(Dual::Num).collect())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Row(vec![Dual::Str(value.into())])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail fast when the row does not have exactly `expected` columns.
    pub fn expect_arity(&self, expected: usize) -> Result<(), RowError> {
        if self.0.len() != expected {
            return Err(RowError::Arity {
                expected,
                actual: self.0.len(),
            });
        }
        Ok(())
    }

    pub fn num_at(&self, column: usize) -> Result<f64, RowError> {
        self.0
            .get(column)
            .and_then(Dual::as_num)
            .ok_or(RowError::Type {
                column,
                expected: "numeric",
            })
    }

    pub fn text_at(&self, column: usize) -> Result<&str, RowError> {
        self.0
            .get(column)
            .map(Dual::text)
            .ok_or(RowError::Arity {
                expected: column + 1,
                actual: self.0.len(),
            })
    }
}

impl From<sse::Row> for Row {
    fn from(row: sse::Row) -> Self {
        Row(row.duals.into_iter().map(Dual::from).collect())
    }
}

impl From<Row> for sse::Row {
    fn from(row: Row) -> Self {
        sse::Row {
            duals: row.0.into_iter().map(sse::Dual::from).collect(),
        }
    }
}

pub fn bundle(rows: Vec<Row>) -> sse::BundledRows {
    sse::BundledRows {
        rows: rows.into_iter().map(sse::Row::from).collect(),
    }
}

pub fn unbundle(bundle: sse::BundledRows) -> Vec<Row> {
    bundle.rows.into_iter().map(Row::from).collect()
}

//
// Response metadata
//

/// Shape of a multi-column result, sent to the client ahead of the rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableShape {
    pub name: String,
    /// Declared row count; -1 when unknown up front.
    pub number_of_rows: i64,
    pub fields: Vec<Param>,
}

impl TableShape {
    pub fn numeric(name: &str, number_of_rows: i64, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            number_of_rows,
            fields: fields
                .iter()
                .map(|f| Param {
                    name: (*f).into(),
                    ty: ParamType::Numeric,
                })
                .collect(),
        }
    }

    pub fn to_description(&self) -> sse::TableDescription {
        sse::TableDescription {
            fields: self
                .fields
                .iter()
                .map(|f| sse::FieldDescription {
                    data_type: f.ty.code(),
                    name: f.name.clone(),
                    tags: Vec::new(),
                })
                .collect(),
            name: self.name.clone(),
            number_of_rows: self.number_of_rows,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_description().encode_to_vec()
    }
}

/// Per-call response metadata side channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// Ask the client not to cache this response.
    pub no_store: bool,
    pub table: Option<TableShape>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_dual_classification() {
        let num = Dual::from(sse::Dual {
            num_data: 4.5,
            str_data: String::new(),
        });
        assert_eq!(num, Dual::Num(4.5));

        let text = Dual::from(sse::Dual {
            num_data: f64::NAN,
            str_data: "Persona\\Me".into(),
        });
        assert_eq!(text.as_str(), Some("Persona\\Me"));
        assert_eq!(text.as_num(), None);

        // Clients that leave numData at its default still get their string through.
        let both = Dual::from(sse::Dual {
            num_data: 0.0,
            str_data: "u1".into(),
        });
        assert_eq!(both.as_str(), Some("u1"));
        assert_eq!(both.as_num(), Some(0.0));
    }

    #[test]
    fn arity_and_type_checks() {
        let row = Row(vec![Dual::Str("a".into()), Dual::Num(2.0)]);
        assert!(row.expect_arity(2).is_ok());
        assert_eq!(
            row.expect_arity(1),
            Err(RowError::Arity {
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(row.num_at(1), Ok(2.0));
        assert!(row.num_at(0).is_err());
        assert_eq!(row.text_at(0), Ok("a"));
        assert!(row.text_at(5).is_err());
    }

    #[test]
    fn empty_string_cells_read_as_empty_text() {
        let empty = Dual::from(sse::Dual {
            num_data: f64::NAN,
            str_data: String::new(),
        });
        assert_eq!(empty.as_str(), None);
        assert_eq!(empty.text(), "");
        assert_eq!(Row(vec![empty]).text_at(0), Ok(""));
    }

    #[test]
    fn table_shape_encodes_fields_in_order() {
        let shape = TableShape::numeric("MaxOfColumns", 1, &["Max1", "Max2"]);
        let desc = sse::TableDescription::decode(shape.encode().as_slice()).unwrap();
        assert_eq!(desc.name, "MaxOfColumns");
        assert_eq!(desc.number_of_rows, 1);
        let names: Vec<_> = desc.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Max1", "Max2"]);
        assert!(desc.fields.iter().all(|f| f.data_type == sse::DataType::Numeric as i32));
    }
}
