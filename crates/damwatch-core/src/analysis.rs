//! Analysis rows: the flattened, upsertable form of [`Aggregates`].
//!
//! One row exists per `(scope, analysis_date)`. Each value maps to a column
//! named `avg_<metric>_<window suffix>`, e.g. `avg_storage_volume_12_months`.

use chrono::NaiveDate;

use crate::{
  resource::Metric,
  window::{Aggregates, Scope, Window},
};

/// One windowed mean destined for a named analysis column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisValue {
  pub window: Window,
  pub metric: Metric,
  pub value:  Option<f64>,
}

impl AnalysisValue {
  pub fn column(&self) -> String { column_name(self.metric, self.window) }
}

/// `avg_<metric>_<window suffix>`
pub fn column_name(metric: Metric, window: Window) -> String {
  format!("avg_{}_{}", metric.column(), window.column_suffix)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRow {
  pub scope:         Scope,
  pub analysis_date: NaiveDate,
  pub values:        Vec<AnalysisValue>,
}

impl AnalysisRow {
  /// Flatten the aggregates for `scope` over `windows` into a row dated
  /// [`Aggregates::as_of`]. Scopes absent from the series yield all-`None`
  /// values.
  pub fn from_aggregates(scope: Scope, aggregates: &Aggregates, windows: &[Window]) -> Self {
    let values = windows
      .iter()
      .flat_map(|&window| {
        Metric::ALL.into_iter().map(move |metric| (window, metric))
      })
      .map(|(window, metric)| AnalysisValue {
        window,
        metric,
        value: aggregates.mean(&scope, window, metric),
      })
      .collect();

    Self { scope, analysis_date: aggregates.as_of(), values }
  }

  pub fn value(&self, window: Window, metric: Metric) -> Option<f64> {
    self
      .values
      .iter()
      .find(|v| v.window == window && v.metric == metric)
      .and_then(|v| v.value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{resource::ResourceRecord, window::aggregate};

  #[test]
  fn row_carries_every_window_and_metric() {
    let as_of = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
    let series = vec![ResourceRecord {
      dam_id:          "203042".into(),
      date:            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
      storage_volume:  Some(80.0),
      percentage_full: Some(55.0),
      storage_inflow:  None,
      storage_release: Some(1.5),
    }];
    let agg = aggregate(&series, &Window::STANDARD, as_of);

    let row = AnalysisRow::from_aggregates(Scope::dam("203042"), &agg, &Window::STANDARD);
    assert_eq!(row.analysis_date, as_of);
    assert_eq!(row.values.len(), 12);
    assert_eq!(row.value(Window::FIVE_YEARS, Metric::PercentageFull), Some(55.0));
    assert_eq!(row.value(Window::TWENTY_YEARS, Metric::StorageInflow), None);

    let columns: Vec<String> = row.values.iter().map(AnalysisValue::column).collect();
    assert!(columns.contains(&"avg_storage_volume_12_months".to_string()));
    assert!(columns.contains(&"avg_storage_release_20_years".to_string()));
  }

  #[test]
  fn unknown_scope_yields_empty_row() {
    let as_of = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
    let agg = aggregate(&[], &Window::STANDARD, as_of);
    let row = AnalysisRow::from_aggregates(Scope::dam("missing"), &agg, &Window::STANDARD);
    assert!(row.values.iter().all(|v| v.value.is_none()));
  }
}
