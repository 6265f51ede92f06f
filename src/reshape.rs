//! Pure transforms from backend payloads to display rows.
//!
//! Effectiveness is carried as a fraction in [0, 1] everywhere in the crate.
//! It is multiplied by 100 in exactly one place, [`percent_value`], which
//! every display path goes through.

use serde::Serialize;
use serde_json::{json, Map, Number, Value};
use std::collections::HashMap;

use crate::api::{Columnar, EffCostMap, GenerationResponse, Record};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::sweep::SweepResults;

const CHOSEN_ACTION: &str = "Chosen_Action";

/// Invert a column-major table into rows. Row order follows the key order
/// of the first column; cells missing from later columns become `null`.
pub fn reshape_columnar(input: &Columnar) -> Vec<Record> {
    let Some((first_field, first_column)) = input.iter().next() else {
        return Vec::new();
    };
    let Some(row_ids) = first_column.as_object() else {
        log(
            Level::Debug,
            Domain::Reshape,
            "not_columnar",
            obj(&[("field", v_str(first_field))]),
        );
        return Vec::new();
    };

    row_ids
        .keys()
        .map(|row_id| {
            input
                .iter()
                .map(|(field, column)| {
                    let cell = column.get(row_id).cloned().unwrap_or(Value::Null);
                    (field.clone(), cell)
                })
                .collect()
        })
        .collect()
}

/// Substring after the last `_`, e.g. `size_3` -> `3`.
pub fn extract_suffix(key: &str) -> &str {
    key.rsplit_once('_').map(|(_, suffix)| suffix).unwrap_or(key)
}

/// Round half-up to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}

/// Fraction to a two-decimal percentage string without the sign.
pub fn percent_value(fraction: f64) -> String {
    format!("{:.2}", fraction * 100.0)
}

/// Fraction to a display percentage, e.g. `0.4567` -> `45.67%`.
pub fn format_percent(fraction: f64) -> String {
    format!("{}%", percent_value(fraction))
}

pub fn format_cost(cost: f64) -> String {
    format!("{:.2}", cost)
}

fn count_key(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
            (None, Some(f)) => Some(f.to_string()),
            _ => None,
        },
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn round_cell(value: &Value) -> Value {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => n
            .as_f64()
            .and_then(|f| Number::from_f64(round2(f)))
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

/// A generated action prepared for the actions table.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRow {
    /// 1-based action number.
    pub action: usize,
    /// Affected instances whose chosen action is this one.
    pub population: usize,
    pub fields: Record,
}

impl ActionRow {
    pub fn to_record(&self) -> Record {
        let mut record = Map::new();
        record.insert("Action".to_string(), json!(self.action));
        record.insert("Population".to_string(), json!(self.population));
        for (k, v) in &self.fields {
            if k != "Action" && k != "Population" {
                record.insert(k.clone(), v.clone());
            }
        }
        record
    }
}

impl Serialize for ActionRow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

/// Number the actions, count how many instances chose each one and round
/// numeric fields to two decimals.
pub fn derive_action_display_rows(actions: &[Record], chosen_action_per_instance: &Map<String, Value>) -> Vec<ActionRow> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in chosen_action_per_instance.values() {
        if let Some(key) = count_key(value) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    actions
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let action = index + 1;
            ActionRow {
                action,
                population: counts.get(&action.to_string()).copied().unwrap_or(0),
                fields: item.iter().map(|(k, v)| (k.clone(), round_cell(v))).collect(),
            }
        })
        .collect()
}

/// The `Chosen_Action` column of `affected_clusters`, as instance -> action.
/// Accepts the columnar form and the record-list form.
pub fn chosen_actions(affected_clusters: &Value) -> Map<String, Value> {
    match affected_clusters {
        Value::Object(columns) => columns
            .get(CHOSEN_ACTION)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        Value::Array(rows) => rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.get(CHOSEN_ACTION).map(|v| (i.to_string(), v.clone())))
            .collect(),
        _ => Map::new(),
    }
}

/// Attach per-action `eff`/`cost` (looked up by action number) to rows.
pub fn enrich_action_rows(rows: &[ActionRow], eff_cost_actions: &EffCostMap) -> Vec<Record> {
    rows.iter()
        .map(|row| {
            let mut record = row.to_record();
            if let Some(ec) = u32::try_from(row.action).ok().and_then(|a| eff_cost_actions.get(&a)) {
                record.insert("eff".to_string(), json!(ec.eff));
                record.insert("cost".to_string(), json!(ec.cost));
            }
            record
        })
        .collect()
}

/// Totals and action rows of one generation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub total_cost: f64,
    /// Fraction in [0, 1].
    pub total_effectiveness: f64,
    pub effectiveness_display: String,
    pub actions: Vec<Record>,
}

pub fn metric_summary(generation: &GenerationResponse) -> MetricSummary {
    let chosen = chosen_actions(&generation.affected_clusters);
    let rows = derive_action_display_rows(&generation.actions, &chosen);
    MetricSummary {
        total_cost: generation.total_cost,
        total_effectiveness: generation.total_effectiveness,
        effectiveness_display: format_percent(generation.total_effectiveness),
        actions: enrich_action_rows(&rows, &generation.eff_cost_actions),
    }
}

/// One candidate of a sweep on the cost/effectiveness scatter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparativePoint {
    pub key: String,
    pub display_key: String,
    pub total_cost: f64,
    pub total_effectiveness: f64,
    pub effectiveness_display: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparativeView {
    pub points: Vec<ComparativePoint>,
    /// (key, error) for candidates that failed.
    pub errors: Vec<(String, String)>,
}

/// Split sweep results into plottable points and failures, in sweep order.
pub fn comparative_points(results: &SweepResults) -> ComparativeView {
    let mut view = ComparativeView::default();
    for (key, entry) in results.iter() {
        match entry.success() {
            Some(success) => {
                let eff = success.generation.total_effectiveness;
                view.points.push(ComparativePoint {
                    key: key.to_string(),
                    display_key: extract_suffix(key).to_string(),
                    total_cost: success.generation.total_cost,
                    total_effectiveness: eff,
                    effectiveness_display: format_percent(eff),
                });
            }
            None => view
                .errors
                .push((key.to_string(), entry.error().unwrap_or_default().to_string())),
        }
    }
    view
}

/// Prepare a data table: rows without a `label` column get `label = 0`,
/// `label` is moved first and the pandas `index` column is dropped.
pub fn ensure_label_column(rows: &[Record]) -> Vec<Record> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let has_label = first.contains_key("label");
    rows.iter()
        .map(|row| {
            let mut out = Map::new();
            let label = if has_label {
                row.get("label").cloned().unwrap_or(Value::Null)
            } else {
                json!(0)
            };
            out.insert("label".to_string(), label);
            for (k, v) in row {
                if k != "label" && k != "index" {
                    out.insert(k.clone(), v.clone());
                }
            }
            out
        })
        .collect()
}
