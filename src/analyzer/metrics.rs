use crate::store::recompute::{percent, round_half_up};
use crate::store::schema::WEEK_DAYS;
use crate::store::table::Table;
use crate::store::value::Value;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    Quantity,
    Percent,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: f64,
    pub unit: MetricUnit,
}

/// Labelled metrics in a fixed order; a metric is present only when its
/// column is.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Summary {
    metrics: Vec<Metric>,
}

impl Summary {
    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|metric| metric.label == label)
            .map(|metric| metric.value)
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Aggregate {
    Sum,
    Mean,
    Distinct,
    Count,
}

const SUMMARY_RULES: [(&str, &str, Aggregate); 7] = [
    ("Total Réalisé", "Réaliser", Aggregate::Sum),
    ("% Moyen Réalisation", "%", Aggregate::Mean),
    ("Nombre de Projets", "Project", Aggregate::Distinct),
    ("Total Opérateurs Présents", "Operateurs Present", Aggregate::Sum),
    ("Production Totale", "Production", Aggregate::Sum),
    (
        "Maintenance (Total min Ouverture)",
        "Maintenance_Total_Minutes_Ouverture",
        Aggregate::Sum,
    ),
    ("Nb Visites Client/Autre", "Visite_Date", Aggregate::Count),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyPoint {
    pub day: String,
    pub total: f64,
}

pub fn summarize(table: &Table) -> Summary {
    let metrics = SUMMARY_RULES
        .iter()
        .filter(|(_, column, _)| table.has_column(column))
        .filter_map(|(label, column, aggregate)| {
            let values = table.column(column)?;
            let (value, unit) = match aggregate {
                Aggregate::Sum => (numbers(&values).sum(), MetricUnit::Quantity),
                Aggregate::Mean => {
                    let (sum, count) = numbers(&values)
                        .fold((0.0, 0_usize), |(sum, count), value| (sum + value, count + 1));
                    if count == 0 {
                        return None;
                    }
                    (sum / count as f64, MetricUnit::Percent)
                }
                Aggregate::Distinct => {
                    let distinct = values
                        .iter()
                        .filter(|value| !value.is_null())
                        .map(|value| value.to_string())
                        .collect::<HashSet<_>>();
                    (distinct.len() as f64, MetricUnit::Count)
                }
                Aggregate::Count => (
                    values.iter().filter(|value| !value.is_null()).count() as f64,
                    MetricUnit::Count,
                ),
            };

            Some(Metric {
                label: label.to_string(),
                value,
                unit,
            })
        })
        .collect();

    Summary { metrics }
}

/// Per-day totals Lundi..Samedi, or `None` unless all six day columns exist.
pub fn weekly_series(table: &Table) -> Option<Vec<WeeklyPoint>> {
    if !WEEK_DAYS.iter().all(|day| table.has_column(day)) {
        return None;
    }

    WEEK_DAYS
        .iter()
        .map(|day| {
            let values = table.column(day)?;
            Some(WeeklyPoint {
                day: day.to_string(),
                total: numbers(&values).sum(),
            })
        })
        .collect()
}

/// `Σ numerator / Σ denominator * 100` per group, rounded to two decimals.
/// Rows whose group cell is empty are left out.
pub fn grouped_ratio(
    table: &Table,
    group: &str,
    numerator: &str,
    denominator: &str,
) -> Option<BTreeMap<String, f64>> {
    let groups = table.column(group)?;
    let numerators = table.column(numerator)?;
    let denominators = table.column(denominator)?;

    let sums = groups
        .iter()
        .zip(numerators.iter().zip(&denominators))
        .filter(|(group, _)| !group.is_null())
        .fold(BTreeMap::new(), |mut acc, (group, (num, den))| {
            let entry = acc.entry(group.to_string()).or_insert((0.0, 0.0));
            entry.0 += num.as_number().unwrap_or_default();
            entry.1 += den.as_number().unwrap_or_default();
            acc
        });

    Some(
        sums.into_iter()
            .map(|(group, (num, den))| (group, round_half_up(percent(num, den), 2)))
            .collect(),
    )
}

fn numbers<'a>(values: &'a [&'a Value]) -> impl Iterator<Item = f64> + 'a {
    values.iter().filter_map(|value| value.as_number())
}

#[cfg(test)]
mod tests {
    use super::{grouped_ratio, summarize, weekly_series};
    use crate::store::table::Table;
    use crate::store::value::{Record, Value};

    fn table(columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::with_rows(
            "test",
            columns.iter().map(|column| column.to_string()).collect(),
            rows.into_iter().map(Record::new).collect(),
        )
    }

    #[test]
    fn summary_skips_absent_columns() {
        let table = table(
            &["Fournisseur", "Cause"],
            vec![vec![Value::text("Acme"), Value::text("retard")]],
        );
        assert!(summarize(&table).is_empty());
    }

    #[test]
    fn summary_follows_rule_order() {
        let table = table(
            &["Project", "Réaliser", "%", "Visite_Date"],
            vec![
                vec![Value::text("A"), Value::Number(50.0), Value::Number(50.0), Value::Null],
                vec![Value::text("A"), Value::text("n/a"), Value::Number(100.0), Value::text("2025-01-02")],
                vec![Value::Null, Value::Number(10.0), Value::Null, Value::Null],
            ],
        );

        let summary = summarize(&table);
        let labels = summary
            .metrics()
            .iter()
            .map(|metric| metric.label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            [
                "Total Réalisé",
                "% Moyen Réalisation",
                "Nombre de Projets",
                "Nb Visites Client/Autre"
            ]
        );
        assert_eq!(summary.get("Total Réalisé"), Some(60.0));
        assert_eq!(summary.get("% Moyen Réalisation"), Some(75.0));
        assert_eq!(summary.get("Nombre de Projets"), Some(1.0));
        assert_eq!(summary.get("Nb Visites Client/Autre"), Some(1.0));
    }

    #[test]
    fn mean_is_omitted_without_numbers() {
        let table = table(&["%"], vec![vec![Value::Null]]);
        assert_eq!(summarize(&table).get("% Moyen Réalisation"), None);
    }

    #[test]
    fn weekly_series_needs_every_day() {
        let days = ["Lundi", "Mardi", "Mercredi", "Jeudi", "Vendredi", "Samedi"];
        let full = table(
            &days,
            vec![
                (1..=6).map(|n| Value::Number(n as f64)).collect(),
                (1..=6).map(|n| Value::Number(n as f64 * 10.0)).collect(),
            ],
        );
        let series = weekly_series(&full).expect("all days present");
        assert_eq!(series.len(), 6);
        assert_eq!(series[0].day, "Lundi");
        assert_eq!(series[0].total, 11.0);
        assert_eq!(series[5].total, 66.0);

        let partial = table(&days[..5], vec![]);
        assert!(weekly_series(&partial).is_none());
    }

    #[test]
    fn grouped_ratio_sums_before_dividing() {
        let table = table(
            &["Project", "Réaliser", "Objecti Semaine"],
            vec![
                vec![Value::text("C8"), Value::Number(1.0), Value::Number(3.0)],
                vec![Value::text("C8"), Value::Number(1.0), Value::Number(0.0)],
                vec![Value::text("D5"), Value::Number(5.0), Value::Number(0.0)],
                vec![Value::Null, Value::Number(9.0), Value::Number(9.0)],
            ],
        );

        let ratios = grouped_ratio(&table, "Project", "Réaliser", "Objecti Semaine")
            .expect("columns present");
        assert_eq!(ratios.len(), 2);
        assert_eq!(ratios.get("C8"), Some(&66.67));
        assert_eq!(ratios.get("D5"), Some(&0.0));
        assert!(grouped_ratio(&table, "Familles", "Réaliser", "Objecti Semaine").is_none());
    }
}
