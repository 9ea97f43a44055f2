use crate::store::table::Table;
use crate::store::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

pub const WEEK_DAYS: [&str; 6] = ["Lundi", "Mardi", "Mercredi", "Jeudi", "Vendredi", "Samedi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
    Number,
    Text,
    Date,
    /// A percentage stored as a plain number, rounded half-up to `decimals`.
    Percent { decimals: u32 },
}

impl ColumnKind {
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::Number | Self::Percent { .. }, Value::Number(_))
                | (Self::Text, Value::Text(_))
                | (Self::Date, Value::Date(_))
        )
    }
}

/// Value a form uses when the field is not submitted at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDefault {
    Today,
    CurrentIsoWeek,
}

/// Choices that depend on the value of another column of the same row, e.g. the
/// product families of the selected project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependentChoices {
    pub column: String,
    pub options: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldDefault>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependentChoices>,
}

impl Column {
    fn of(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            choices: Vec::new(),
            default: None,
            min: None,
            max: None,
            depends_on: None,
        }
    }

    pub fn number(name: &str) -> Self {
        Self::of(name, ColumnKind::Number)
    }

    pub fn text(name: &str) -> Self {
        Self::of(name, ColumnKind::Text)
    }

    pub fn date(name: &str) -> Self {
        Self::of(name, ColumnKind::Date)
    }

    pub fn percent(name: &str, decimals: u32) -> Self {
        Self::of(name, ColumnKind::Percent { decimals })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|choice| choice.to_string()).collect();
        self
    }

    pub fn default_to(mut self, default: FieldDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn between(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Restricts the column to `options[parent]` once `column` holds `parent`.
    pub fn depends_on(mut self, column: &str, options: &[(&str, &[&str])]) -> Self {
        let options = options
            .iter()
            .map(|(parent, choices)| {
                (
                    parent.to_string(),
                    choices.iter().map(|choice| choice.to_string()).collect(),
                )
            })
            .collect();
        self.depends_on = Some(DependentChoices {
            column: column.to_string(),
            options,
        });
        self
    }

    /// Choices left once the parent column holds `parent`; `None` leaves the
    /// column unrestricted.
    pub fn choices_for(&self, parent: &Value) -> Option<&[String]> {
        let dependency = self.depends_on.as_ref()?;
        match parent {
            Value::Text(key) => dependency.options.get(key).map(Vec::as_slice),
            _ => None,
        }
    }

    pub fn check_bounds(&self, value: &Value) -> Result<(), String> {
        let Some(number) = value.as_number() else {
            return Ok(());
        };
        if let Some(min) = self.min.filter(|min| number < *min) {
            return Err(format!("must be at least {min}"));
        }
        if let Some(max) = self.max.filter(|max| number > *max) {
            return Err(format!("must be at most {max}"));
        }
        Ok(())
    }
}

/// A column whose value is computed from other columns of the same row and
/// rewritten on every save.
#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    /// `numerator / Σ denominator * 100`, `0` when the denominator is zero.
    Ratio {
        target: String,
        numerator: String,
        denominator: Vec<String>,
    },
    /// `(opening - stoppage) / opening * 100`, `0` when opening is zero.
    Availability {
        target: String,
        opening: String,
        stoppage: String,
    },
    Sum {
        target: String,
        columns: Vec<String>,
    },
    Scale {
        target: String,
        source: String,
        factor: f64,
    },
}

impl Derivation {
    pub fn ratio(target: &str, numerator: &str, denominator: &[&str]) -> Self {
        Self::Ratio {
            target: target.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.iter().map(|column| column.to_string()).collect(),
        }
    }

    pub fn availability(target: &str, opening: &str, stoppage: &str) -> Self {
        Self::Availability {
            target: target.to_string(),
            opening: opening.to_string(),
            stoppage: stoppage.to_string(),
        }
    }

    pub fn sum(target: &str, columns: &[String]) -> Self {
        Self::Sum {
            target: target.to_string(),
            columns: columns.to_vec(),
        }
    }

    pub fn scale(target: &str, source: &str, factor: f64) -> Self {
        Self::Scale {
            target: target.to_string(),
            source: source.to_string(),
            factor,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Ratio { target, .. }
            | Self::Availability { target, .. }
            | Self::Sum { target, .. }
            | Self::Scale { target, .. } => target,
        }
    }

    #[cfg(test)]
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Self::Ratio {
                numerator,
                denominator,
                ..
            } => std::iter::once(numerator.as_str())
                .chain(denominator.iter().map(String::as_str))
                .collect(),
            Self::Availability {
                opening, stoppage, ..
            } => vec![opening.as_str(), stoppage.as_str()],
            Self::Sum { columns, .. } => columns.iter().map(String::as_str).collect(),
            Self::Scale { source, .. } => vec![source.as_str()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TotalRow {
    pub label: String,
    /// Applied to every summed column, e.g. `1/60` for a row in hours.
    pub scale: f64,
}

impl TotalRow {
    pub fn new(label: &str, scale: f64) -> Self {
        Self {
            label: label.to_string(),
            scale,
        }
    }
}

/// Fixed day rows keyed by `key_column`, followed by computed total rows.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyLayout {
    pub key_column: String,
    pub days: Vec<String>,
    pub totals: Vec<TotalRow>,
    pub defaults: Vec<(String, Value)>,
    pub constants: Vec<(String, Value)>,
}

impl WeeklyLayout {
    pub fn new(key_column: &str, totals: Vec<TotalRow>) -> Self {
        Self {
            key_column: key_column.to_string(),
            days: WEEK_DAYS.iter().map(|day| day.to_string()).collect(),
            totals,
            defaults: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn with_default(mut self, column: &str, value: Value) -> Self {
        self.defaults.push((column.to_string(), value));
        self
    }

    pub fn with_constant(mut self, column: &str, value: Value) -> Self {
        self.constants.push((column.to_string(), value));
        self
    }

    /// Accepts a day label (case-insensitive) or a zero-based index.
    pub fn day_index(&self, day: &str) -> Option<usize> {
        let trimmed = day.trim();
        self.days
            .iter()
            .position(|label| label.eq_ignore_ascii_case(trimmed))
            .or_else(|| {
                trimmed
                    .parse::<usize>()
                    .ok()
                    .filter(|index| *index < self.days.len())
            })
    }

    pub fn is_constant(&self, column: &str) -> bool {
        self.constants.iter().any(|(name, _)| name == column)
    }

    pub fn is_total_label(&self, label: &str) -> bool {
        self.totals.iter().any(|total| total.label == label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Append,
    Weekly(WeeklyLayout),
}

/// Everything the store needs to know about one table: where it lives, its
/// ordered columns, its derived columns and how rows are laid out.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub id: String,
    pub title: String,
    pub file: String,
    pub sheet: String,
    columns: Vec<Column>,
    derivations: Vec<Derivation>,
    layout: Layout,
}

impl TableSchema {
    pub fn new(id: &str, title: &str, file: &str, sheet: &str, columns: Vec<Column>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            file: file.to_string(),
            sheet: sheet.to_string(),
            columns,
            derivations: Vec::new(),
            layout: Layout::Append,
        }
    }

    pub fn weekly(mut self, layout: WeeklyLayout) -> Self {
        self.layout = Layout::Weekly(layout);
        self
    }

    pub fn derive(mut self, derivation: Derivation) -> Self {
        self.derivations.push(derivation);
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn derivations(&self) -> &[Derivation] {
        &self.derivations
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn weekly_layout(&self) -> Option<&WeeklyLayout> {
        match &self.layout {
            Layout::Weekly(weekly) => Some(weekly),
            Layout::Append => None,
        }
    }

    pub fn is_derived(&self, column: &str) -> bool {
        self.derivations
            .iter()
            .any(|derivation| derivation.target() == column)
    }

    /// Columns an operator may write directly.
    pub fn editable_columns(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|column| !self.is_derived(&column.name))
            .filter(|column| match &self.layout {
                Layout::Append => true,
                Layout::Weekly(weekly) => {
                    column.name != weekly.key_column && !weekly.is_constant(&column.name)
                }
            })
            .collect()
    }

    pub fn empty_table(&self) -> Table {
        Table::new(self.id.clone(), self.column_names())
    }

    /// Builds a record from `(column, value)` pairs; unnamed columns are null.
    #[cfg(test)]
    pub fn record<'a>(
        &self,
        pairs: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<crate::store::value::Record, String> {
        let mut record = crate::store::value::Record::nulls(self.columns.len());
        for (name, value) in pairs {
            let index = self
                .column_index(name)
                .ok_or_else(|| format!("unknown column '{name}' for table {}", self.id))?;
            record.set(index, value);
        }
        Ok(record)
    }
}
