use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::fmt;

/// A single cell. Empty text is always stored as `Null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.trim().is_empty() {
            Self::Null
        } else {
            Self::Text(raw)
        }
    }

    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Null
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
        }
    }
}

/// Parses a number the way operators type them: surrounding spaces, a comma as
/// decimal separator and a trailing `%` are accepted.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.split([' ', 'T']).next().unwrap_or(trimmed);

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d/%m/%Y"))
        .ok()
}

/// Converts an Excel serial date (days since 1899-12-30) into a calendar date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }

    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// One row: exactly one value per column of the owning table, in column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn nulls(width: usize) -> Self {
        Self {
            values: vec![Value::Null; width],
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// True when every cell is null.
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }
}

#[cfg(test)]
mod tests {
    use super::{Value, excel_serial_to_date, parse_date, parse_number};
    use chrono::NaiveDate;

    #[test]
    fn blank_text_is_null() {
        assert_eq!(Value::text("   "), Value::Null);
        assert_eq!(Value::text("G11"), Value::Text("G11".to_string()));
    }

    #[test]
    fn non_finite_numbers_are_not_stored() {
        assert_eq!(Value::number(f64::NAN), Value::Null);
        assert_eq!(Value::number(f64::INFINITY), Value::Null);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn parses_operator_numbers() {
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number(" 91.7% "), Some(91.7));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn parses_iso_and_french_dates() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date");
        assert_eq!(parse_date("2025-03-14"), Some(expected));
        assert_eq!(parse_date("14/03/2025"), Some(expected));
        assert_eq!(parse_date("2025-03-14 00:00:00"), Some(expected));
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn converts_excel_serials() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        assert_eq!(excel_serial_to_date(45292.0), Some(expected));
    }

    #[test]
    fn display_drops_trailing_zero_fraction() {
        assert_eq!(Value::Number(50.0).to_string(), "50");
        assert_eq!(Value::Number(91.7).to_string(), "91.7");
        assert_eq!(Value::Null.to_string(), "");
    }
}
