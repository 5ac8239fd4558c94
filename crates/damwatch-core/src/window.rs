//! Retrospective windows and the windowed aggregator.
//!
//! A window is the interval `[as_of − span, as_of]`, anchored at the
//! evaluation date rather than at the data. Membership only checks the lower
//! bound, so future-dated records fall inside every window.
//!
//! [`aggregate`] is a pure function: given the same series, windows and
//! `as_of` it always produces the same [`Aggregates`].

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

use chrono::{Days, NaiveDate};

use crate::resource::{Metric, ResourceRecord};

// ─── Window ──────────────────────────────────────────────────────────────────

/// A fixed-span retrospective window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Window {
  /// Human-readable label, e.g. `"12 months"`.
  pub label:         &'static str,
  /// Suffix used in analysis column names, e.g. `"12_months"`.
  pub column_suffix: &'static str,
  pub span_days:     u64,
}

impl Window {
  pub const TWELVE_MONTHS: Window = Window {
    label:         "12 months",
    column_suffix: "12_months",
    span_days:     365,
  };

  pub const FIVE_YEARS: Window = Window {
    label:         "5 years",
    column_suffix: "5_years",
    span_days:     5 * 365,
  };

  pub const TWENTY_YEARS: Window = Window {
    label:         "20 years",
    column_suffix: "20_years",
    span_days:     20 * 365,
  };

  /// The windows every analysis row carries, shortest first.
  pub const STANDARD: [Window; 3] =
    [Window::TWELVE_MONTHS, Window::FIVE_YEARS, Window::TWENTY_YEARS];

  /// First date (inclusive) inside the window.
  pub fn start(&self, as_of: NaiveDate) -> NaiveDate {
    as_of
      .checked_sub_days(Days::new(self.span_days))
      .unwrap_or(NaiveDate::MIN)
  }

  pub fn contains(&self, as_of: NaiveDate, date: NaiveDate) -> bool {
    date >= self.start(as_of)
  }
}

impl fmt::Display for Window {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label)
  }
}

// ─── Scope ───────────────────────────────────────────────────────────────────

/// What an aggregate is computed over: one dam, or every dam pooled.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
  Dam(String),
  All,
}

impl Scope {
  pub fn dam(dam_id: impl Into<String>) -> Self { Scope::Dam(dam_id.into()) }

  pub fn dam_id(&self) -> Option<&str> {
    match self {
      Scope::Dam(id) => Some(id),
      Scope::All => None,
    }
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scope::Dam(id) => write!(f, "dam {id}"),
      Scope::All => f.write_str("ALL"),
    }
  }
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
  sum:   f64,
  count: usize,
}

impl Mean {
  fn push(&mut self, value: f64) {
    self.sum += value;
    self.count += 1;
  }

  fn value(self) -> Option<f64> {
    (self.count > 0).then(|| self.sum / self.count as f64)
  }
}

/// Per-(scope, window, metric) means plus per-(scope, window) record counts.
///
/// A mean is `None` when no record in the window carried a value for the
/// metric. It is never defaulted to zero.
#[derive(Debug, Clone)]
pub struct Aggregates {
  as_of:  NaiveDate,
  scopes: BTreeSet<Scope>,
  means:  BTreeMap<(Scope, Window, Metric), Option<f64>>,
  counts: BTreeMap<(Scope, Window), usize>,
}

impl Aggregates {
  pub fn as_of(&self) -> NaiveDate { self.as_of }

  /// Every dam that appeared in the series, followed by [`Scope::All`].
  pub fn scopes(&self) -> impl Iterator<Item = &Scope> { self.scopes.iter() }

  pub fn mean(&self, scope: &Scope, window: Window, metric: Metric) -> Option<f64> {
    self
      .means
      .get(&(scope.clone(), window, metric))
      .copied()
      .flatten()
  }

  /// Number of records for `scope` whose date falls inside `window`.
  pub fn record_count(&self, scope: &Scope, window: Window) -> usize {
    self
      .counts
      .get(&(scope.clone(), window))
      .copied()
      .unwrap_or(0)
  }
}

/// Compute the mean of every metric over every window, per dam and pooled.
///
/// The [`Scope::All`] mean is a plain pooled mean over every in-window record
/// of every dam, with no per-dam weighting.
pub fn aggregate(
  series: &[ResourceRecord],
  windows: &[Window],
  as_of: NaiveDate,
) -> Aggregates {
  let mut scopes = BTreeSet::from([Scope::All]);
  scopes.extend(series.iter().map(|r| Scope::dam(r.dam_id.as_str())));

  let mut accumulators: BTreeMap<(Scope, Window, Metric), Mean> = BTreeMap::new();
  let mut counts: BTreeMap<(Scope, Window), usize> = BTreeMap::new();

  for &window in windows {
    for record in series.iter().filter(|r| window.contains(as_of, r.date)) {
      for scope in [Scope::dam(record.dam_id.as_str()), Scope::All] {
        *counts.entry((scope.clone(), window)).or_default() += 1;
        for metric in Metric::ALL {
          if let Some(value) = record.metric(metric).filter(|v| v.is_finite()) {
            accumulators
              .entry((scope.clone(), window, metric))
              .or_default()
              .push(value);
          }
        }
      }
    }
  }

  let mut means = BTreeMap::new();
  for scope in &scopes {
    for &window in windows {
      for metric in Metric::ALL {
        let key = (scope.clone(), window, metric);
        let mean = accumulators.get(&key).and_then(|m| m.value());
        means.insert(key, mean);
      }
    }
  }

  Aggregates { as_of, scopes, means, counts }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn volume(dam_id: &str, date: NaiveDate, storage_volume: f64) -> ResourceRecord {
    ResourceRecord {
      dam_id: dam_id.into(),
      date,
      storage_volume: Some(storage_volume),
      percentage_full: None,
      storage_inflow: None,
      storage_release: None,
    }
  }

  #[test]
  fn twelve_month_and_five_year_means() {
    let series = vec![
      volume("203042", date(2020, 1, 1), 100.0),
      volume("203042", date(2024, 6, 1), 80.0),
    ];
    let windows = [Window::TWELVE_MONTHS, Window::FIVE_YEARS];
    let agg = aggregate(&series, &windows, date(2024, 12, 1));

    let dam = Scope::dam("203042");
    assert_eq!(
      agg.mean(&dam, Window::TWELVE_MONTHS, Metric::StorageVolume),
      Some(80.0)
    );
    assert_eq!(
      agg.mean(&dam, Window::FIVE_YEARS, Metric::StorageVolume),
      Some(90.0)
    );
    assert_eq!(agg.record_count(&dam, Window::TWELVE_MONTHS), 1);
    assert_eq!(agg.record_count(&dam, Window::FIVE_YEARS), 2);
  }

  #[test]
  fn empty_window_is_none_not_zero() {
    let series = vec![volume("203042", date(2000, 1, 1), 50.0)];
    let agg = aggregate(&series, &Window::STANDARD, date(2024, 12, 1));

    let dam = Scope::dam("203042");
    assert_eq!(agg.mean(&dam, Window::TWELVE_MONTHS, Metric::StorageVolume), None);
    assert_eq!(agg.mean(&dam, Window::FIVE_YEARS, Metric::StorageVolume), None);
    assert_eq!(
      agg.mean(&dam, Window::TWENTY_YEARS, Metric::StorageVolume),
      Some(50.0)
    );
  }

  #[test]
  fn metric_without_values_is_none_even_with_records() {
    let series = vec![volume("203042", date(2024, 11, 1), 50.0)];
    let agg = aggregate(&series, &Window::STANDARD, date(2024, 12, 1));

    let dam = Scope::dam("203042");
    assert_eq!(agg.record_count(&dam, Window::TWELVE_MONTHS), 1);
    assert_eq!(agg.mean(&dam, Window::TWELVE_MONTHS, Metric::PercentageFull), None);
  }

  #[test]
  fn all_scope_is_a_pooled_mean() {
    let series = vec![
      volume("a", date(2024, 10, 1), 10.0),
      volume("a", date(2024, 11, 1), 20.0),
      volume("b", date(2024, 11, 1), 90.0),
    ];
    let agg = aggregate(&series, &Window::STANDARD, date(2024, 12, 1));

    // (10 + 20 + 90) / 3, not the mean of the per-dam means (15 + 90) / 2.
    assert_eq!(
      agg.mean(&Scope::All, Window::TWELVE_MONTHS, Metric::StorageVolume),
      Some(40.0)
    );
    assert_eq!(agg.record_count(&Scope::All, Window::TWELVE_MONTHS), 3);
  }

  #[test]
  fn future_dated_records_are_included() {
    let series = vec![volume("a", date(2030, 1, 1), 7.0)];
    let agg = aggregate(&series, &[Window::TWELVE_MONTHS], date(2024, 12, 1));
    assert_eq!(
      agg.mean(&Scope::dam("a"), Window::TWELVE_MONTHS, Metric::StorageVolume),
      Some(7.0)
    );
  }

  #[test]
  fn window_start_is_inclusive() {
    let as_of = date(2024, 12, 1);
    let start = Window::TWELVE_MONTHS.start(as_of);
    assert_eq!(start, date(2023, 12, 2));
    assert!(Window::TWELVE_MONTHS.contains(as_of, start));
    assert!(!Window::TWELVE_MONTHS.contains(as_of, date(2023, 12, 1)));
  }

  #[test]
  fn wider_windows_never_hold_fewer_records() {
    let as_of = date(2024, 12, 1);
    let series: Vec<_> = (0..40)
      .map(|i| volume("a", date(1990 + (i % 35), 1 + (i as u32 % 12), 15), i as f64))
      .collect();
    let agg = aggregate(&series, &Window::STANDARD, as_of);

    for scope in [Scope::dam("a"), Scope::All] {
      let counts: Vec<usize> = Window::STANDARD
        .iter()
        .map(|&w| agg.record_count(&scope, w))
        .collect();
      assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]), "{counts:?}");
    }
  }

  #[test]
  fn empty_series_still_reports_the_all_scope() {
    let agg = aggregate(&[], &Window::STANDARD, date(2024, 12, 1));
    let scopes: Vec<_> = agg.scopes().cloned().collect();
    assert_eq!(scopes, vec![Scope::All]);
    assert_eq!(
      agg.mean(&Scope::All, Window::FIVE_YEARS, Metric::StorageInflow),
      None
    );
  }
}
