//! Value conversion across the interpreter boundary
//!
//! Host parameters travel as a [`TabularParameters`] table whose first row
//! becomes the positional argument list of a call. Results come back as an
//! opaque [`ForeignObject`] that converts into one of a closed set of host
//! types ([`HostType`]).

use crate::errors::BridgeError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use pyhost_logger as logger;
use pyo3::prelude::*;
use pyo3::types::{
    PyBool, PyByteArray, PyBytes, PyFloat, PyInt, PyList, PyModule, PyString, PyTuple,
};
use pyo3::IntoPyObjectExt;

/// Years `datetime.datetime` can represent
const PYTHON_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// Declared type of a parameter column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    DateTime,
    /// A host type with no defined conversion, kept by name for error reporting
    Object(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

/// A single host cell value
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
}

impl HostValue {
    /// Column type a value of this kind belongs to; nulls are typed as text
    pub fn column_type(&self) -> ColumnType {
        match self {
            HostValue::Null | HostValue::Text(_) => ColumnType::Text,
            HostValue::Bool(_) => ColumnType::Bool,
            HostValue::Int(_) => ColumnType::Int,
            HostValue::Float(_) => ColumnType::Float,
            HostValue::Bytes(_) => ColumnType::Bytes,
            HostValue::DateTime(_) => ColumnType::DateTime,
        }
    }

    fn fits(&self, kind: &ColumnType) -> bool {
        matches!(self, HostValue::Null) || self.column_type() == *kind
    }

    fn to_foreign<'py>(&self, py: Python<'py>) -> Result<Bound<'py, PyAny>, BridgeError> {
        let value = match self {
            HostValue::Null => py.None().into_bound(py),
            HostValue::Bool(b) => PyBool::new(py, *b).to_owned().into_any(),
            HostValue::Int(i) => i.into_bound_py_any(py)?,
            HostValue::Float(f) => PyFloat::new(py, *f).into_any(),
            HostValue::Text(s) => PyString::new(py, s).into_any(),
            HostValue::Bytes(b) => PyBytes::new(py, b).into_any(),
            HostValue::DateTime(dt) => {
                let datetime = PyModule::import(py, "datetime")?.getattr("datetime")?;
                // Leap seconds carry nanos >= 1e9, which Python cannot represent
                let micros = (dt.nanosecond() / 1_000).min(999_999);
                datetime.call1((
                    dt.year(),
                    dt.month(),
                    dt.day(),
                    dt.hour(),
                    dt.minute(),
                    dt.second(),
                    micros,
                ))?
            }
        };
        Ok(value)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Int(i64::from(value))
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Text(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Text(value)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        HostValue::Bytes(value)
    }
}

impl From<NaiveDateTime> for HostValue {
    fn from(value: NaiveDateTime) -> Self {
        HostValue::DateTime(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Null, Into::into)
    }
}

/// Named, typed columns plus rows of cells
///
/// Only the first row is ever used, as the positional argument list of a
/// single call. Later rows are accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularParameters {
    columns: Vec<Column>,
    rows: Vec<Vec<HostValue>>,
}

impl TabularParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-row table with column types taken from the values
    pub fn single_row<N, V, I>(cells: I) -> Self
    where
        N: Into<String>,
        V: Into<HostValue>,
        I: IntoIterator<Item = (N, V)>,
    {
        let mut table = Self::new();
        let mut row = Vec::new();
        for (name, value) in cells {
            let value = value.into();
            table.columns.push(Column {
                name: name.into(),
                kind: value.column_type(),
            });
            row.push(value);
        }
        table.rows.push(row);
        table
    }

    pub fn with_column(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
        });
        self
    }

    /// Append a row; its width must match the column count
    pub fn push_row(&mut self, row: Vec<HostValue>) -> Result<(), BridgeError> {
        if row.len() != self.columns.len() {
            return Err(BridgeError::Marshal(format!(
                "row has {} values but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn with_row(mut self, row: Vec<HostValue>) -> Result<Self, BridgeError> {
        self.push_row(row)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Validate and return the first row, or `None` for an empty table
    pub fn argument_row(&self) -> Result<Option<&[HostValue]>, BridgeError> {
        let Some(row) = self.rows.first() else {
            return Ok(None);
        };
        if self.rows.len() > 1 {
            logger::debug(&format!(
                "Only the first of {} parameter rows is used",
                self.rows.len()
            ));
        }
        if row.len() != self.columns.len() {
            return Err(BridgeError::Marshal(format!(
                "row has {} values but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(row) {
            if let ColumnType::Object(type_name) = &column.kind {
                return Err(BridgeError::Marshal(format!(
                    "column '{}' has type {} with no Python conversion",
                    column.name, type_name
                )));
            }
            if !value.fits(&column.kind) {
                return Err(BridgeError::Marshal(format!(
                    "column '{}' is declared {:?} but holds {:?}",
                    column.name, column.kind, value
                )));
            }
            if let HostValue::DateTime(dt) = value {
                if !PYTHON_YEARS.contains(&dt.year()) {
                    return Err(BridgeError::Marshal(format!(
                        "column '{}' holds {}, outside Python's datetime range",
                        column.name, dt
                    )));
                }
            }
        }
        Ok(Some(row))
    }
}

/// Convert the first row of `table` into foreign objects, in column order
pub fn to_foreign_args<'py>(
    py: Python<'py>,
    table: &TabularParameters,
) -> Result<Vec<ForeignObject<'py>>, BridgeError> {
    let Some(row) = table.argument_row()? else {
        return Ok(Vec::new());
    };
    row.iter()
        .map(|value| value.to_foreign(py).map(ForeignObject::new))
        .collect()
}

/// Positional argument tuple for an optional parameter table
pub(crate) fn call_args<'py>(
    py: Python<'py>,
    params: Option<&TabularParameters>,
) -> Result<Bound<'py, PyTuple>, BridgeError> {
    let args = match params {
        Some(table) => to_foreign_args(py, table)?,
        None => Vec::new(),
    };
    Ok(PyTuple::new(py, args.into_iter().map(ForeignObject::into_bound))?)
}

/// Opaque handle to a value owned by the interpreter
#[derive(Debug, Clone)]
pub struct ForeignObject<'py> {
    inner: Bound<'py, PyAny>,
}

impl<'py> ForeignObject<'py> {
    pub fn new(inner: Bound<'py, PyAny>) -> Self {
        Self { inner }
    }

    pub fn into_bound(self) -> Bound<'py, PyAny> {
        self.inner
    }

    /// Python type name of the value
    pub fn type_name(&self) -> String {
        python_type_name(&self.inner)
    }

    pub fn to_host<T: HostType>(&self) -> Result<T, BridgeError> {
        T::from_foreign(&self.inner)
    }
}

fn python_type_name(obj: &Bound<'_, PyAny>) -> String {
    obj.get_type()
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}

fn invalid_cast<T>(obj: &Bound<'_, PyAny>) -> BridgeError {
    BridgeError::InvalidCast {
        target: std::any::type_name::<T>(),
        found: python_type_name(obj),
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Host types a foreign result can be converted into
///
/// The set is closed: conversions rely on the interpreter bridge's native
/// extraction and never widen or narrow beyond it.
pub trait HostType: sealed::Sealed + Sized {
    fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError>;
}

macro_rules! native_host_type {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl HostType for $ty {
                fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError> {
                    obj.extract::<$ty>().map_err(|_| invalid_cast::<$ty>(obj))
                }
            }
        )*
    };
}

native_host_type!(bool, i32, i64, f64, String);

impl sealed::Sealed for () {}

impl HostType for () {
    fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError> {
        if obj.is_none() {
            Ok(())
        } else {
            Err(invalid_cast::<()>(obj))
        }
    }
}

impl sealed::Sealed for Vec<u8> {}

impl HostType for Vec<u8> {
    fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError> {
        if let Ok(bytes) = obj.cast::<PyBytes>() {
            return Ok(bytes.as_bytes().to_vec());
        }
        if let Ok(array) = obj.cast::<PyByteArray>() {
            return Ok(array.to_vec());
        }
        Err(invalid_cast::<Vec<u8>>(obj))
    }
}

impl sealed::Sealed for NaiveDateTime {}

impl HostType for NaiveDateTime {
    fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError> {
        let py = obj.py();
        let datetime = PyModule::import(py, "datetime")?.getattr("datetime")?;
        if !obj.is_instance(&datetime)? {
            return Err(invalid_cast::<NaiveDateTime>(obj));
        }
        let field = |name: &str| -> Result<u32, BridgeError> {
            Ok(obj.getattr(name)?.extract::<u32>()?)
        };
        let year = obj.getattr("year")?.extract::<i32>()?;
        NaiveDate::from_ymd_opt(year, field("month")?, field("day")?)
            .and_then(|date| {
                date.and_hms_micro_opt(
                    field("hour").ok()?,
                    field("minute").ok()?,
                    field("second").ok()?,
                    field("microsecond").ok()?,
                )
            })
            .ok_or_else(|| invalid_cast::<NaiveDateTime>(obj))
    }
}

impl sealed::Sealed for HostValue {}

impl HostType for HostValue {
    fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError> {
        if obj.is_none() {
            return Ok(HostValue::Null);
        }
        if obj.is_instance_of::<PyBool>() {
            return bool::from_foreign(obj).map(HostValue::Bool);
        }
        if obj.is_instance_of::<PyInt>() {
            return i64::from_foreign(obj).map(HostValue::Int);
        }
        if obj.is_instance_of::<PyFloat>() {
            return f64::from_foreign(obj).map(HostValue::Float);
        }
        if obj.is_instance_of::<PyString>() {
            return String::from_foreign(obj).map(HostValue::Text);
        }
        if obj.is_instance_of::<PyBytes>() || obj.is_instance_of::<PyByteArray>() {
            return Vec::<u8>::from_foreign(obj).map(HostValue::Bytes);
        }
        NaiveDateTime::from_foreign(obj)
            .map(HostValue::DateTime)
            .map_err(|_| invalid_cast::<HostValue>(obj))
    }
}

impl<T: HostType> sealed::Sealed for Option<T> {}

impl<T: HostType> HostType for Option<T> {
    fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError> {
        if obj.is_none() {
            Ok(None)
        } else {
            T::from_foreign(obj).map(Some)
        }
    }
}

impl<T: HostType> sealed::Sealed for Vec<T> {}

impl<T: HostType> HostType for Vec<T> {
    fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError> {
        if let Ok(list) = obj.cast::<PyList>() {
            return list.iter().map(|item| T::from_foreign(&item)).collect();
        }
        if let Ok(tuple) = obj.cast::<PyTuple>() {
            return tuple.iter().map(|item| T::from_foreign(&item)).collect();
        }
        Err(invalid_cast::<Self>(obj))
    }
}

macro_rules! tuple_host_type {
    ($len:expr => $($name:ident : $index:tt),+) => {
        impl<$($name: HostType),+> sealed::Sealed for ($($name,)+) {}

        impl<$($name: HostType),+> HostType for ($($name,)+) {
            fn from_foreign(obj: &Bound<'_, PyAny>) -> Result<Self, BridgeError> {
                let tuple = obj.cast::<PyTuple>().map_err(|_| invalid_cast::<Self>(obj))?;
                if tuple.len() != $len {
                    return Err(invalid_cast::<Self>(obj));
                }
                Ok(($($name::from_foreign(&tuple.get_item($index)?)?,)+))
            }
        }
    };
}

tuple_host_type!(2 => A: 0, B: 1);
tuple_host_type!(3 => A: 0, B: 1, C: 2);
