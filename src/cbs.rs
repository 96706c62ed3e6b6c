//! Event-log to customer-by-sufficient-statistics (CBS) transform.
//!
//! Statistics produced per customer, all relative to the calibration/holdout
//! split:
//! - `first`: date of the first calibration purchase
//! - `t_x`: periods between the first and last calibration purchase
//! - `sales` / `sales_star`: calibration / holdout sales totals
//! - `litt`: sum of log inter-transaction times over calibration purchases
//! - `x`: repeat calibration periods (the first active period is excluded)
//! - `x_star`: raw holdout transaction count (not period-collapsed)
//! - `t_star`: holdout window length in periods, identical on every row

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::elog::Event;

const SECONDS_PER_DAY: f64 = 86_400.0;
const BOUNDARY_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbsConfig {
    /// Period granularity divisor: offsets are reported in units of
    /// `1 / days_in_period` days. `1` means daily periods.
    pub days_in_period: u32,
    /// Last day of the calibration window, `%Y-%m-%d`. Defaults to the
    /// latest event date in the log.
    pub calibration_end: Option<String>,
    /// Last day of the holdout window, `%Y-%m-%d`. Events after this date
    /// are dropped. Defaults to the latest event date in the log.
    pub observation_end: Option<String>,
}

impl Default for CbsConfig {
    fn default() -> Self {
        Self {
            days_in_period: 1,
            calibration_end: None,
            observation_end: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbsRow<C> {
    pub customer_id: C,
    pub first: DateTime<Utc>,
    pub t_x: f64,
    pub sales: f64,
    pub litt: f64,
    pub x: u64,
    pub x_star: u64,
    pub sales_star: f64,
    pub t_star: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbsReport {
    pub input_events: u64,
    pub truncated_events: u64,
    pub calibration_events: u64,
    pub holdout_events: u64,
    pub customers: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CbsError {
    #[error("invalid cbs config: {0}")]
    InvalidConfig(String),
    #[error("invalid cbs request: {0}")]
    InvalidRequest(String),
    #[error("{field} value '{value}' does not match the %Y-%m-%d date format")]
    InvalidDateFormat { field: &'static str, value: String },
    #[error("event date {date} is not a valid YYYYMMDD calendar date")]
    MalformedEvent { date: u32 },
    #[error("invalid UTC timestamp: {0}")]
    InvalidTimestamp(i64),
}

struct NormalizedEvent<'a, C> {
    customer_id: &'a C,
    ts: i64,
    sales: f64,
}

struct HoldoutSummary {
    x_star: u64,
    sales_star: f64,
}

struct PeriodTables<'a, C: Ord> {
    // customer -> period timestamp -> summed sales
    calibration: BTreeMap<&'a C, BTreeMap<i64, f64>>,
    holdout: BTreeMap<&'a C, HoldoutSummary>,
    truncated_events: u64,
    calibration_events: u64,
    holdout_events: u64,
}

struct CalibrationSummary {
    first_ts: i64,
    t_x: f64,
    sales: f64,
    litt: f64,
    x: u64,
}

/// Collapses a transaction event log into one CBS row per customer with
/// calibration activity, plus transform accounting counters.
pub fn elog_to_cbs<C>(
    events: &[Event<C>],
    cfg: &CbsConfig,
) -> Result<(Vec<CbsRow<C>>, CbsReport), CbsError>
where
    C: Ord + Clone,
{
    validate_config(cfg)?;
    let mult = SECONDS_PER_DAY / f64::from(cfg.days_in_period);

    info!(
        component = "cbs",
        event = "cbs.transform.start",
        input_events = events.len(),
        days_in_period = cfg.days_in_period,
        calibration_end = ?cfg.calibration_end,
        observation_end = ?cfg.observation_end
    );

    // Boundary strings must fail before any per-event work happens.
    let calibration_end = parse_boundary("calibration_end", cfg.calibration_end.as_deref())?;
    let observation_end = parse_boundary("observation_end", cfg.observation_end.as_deref())?;

    let normalized = normalize_events(events)?;
    let Some(max_ts) = normalized.iter().map(|event| event.ts).max() else {
        let report = CbsReport::default();
        log_finish(&report);
        return Ok((Vec::new(), report));
    };

    let calibration_end_ts = calibration_end.unwrap_or(max_ts);
    let observation_end_ts = observation_end.unwrap_or(max_ts);
    if observation_end_ts < calibration_end_ts {
        return Err(CbsError::InvalidRequest(
            "observation_end must not precede calibration_end".to_string(),
        ));
    }
    let t_star = (observation_end_ts - calibration_end_ts) as f64 / mult;

    let tables = split_periods(&normalized, calibration_end_ts, observation_end_ts);
    if tables.truncated_events > 0 {
        info!(
            component = "cbs",
            event = "cbs.transform.truncated",
            truncated_events = tables.truncated_events,
            observation_end_ts = observation_end_ts
        );
    }

    let rows = merge_summaries(&tables.calibration, &tables.holdout, mult, t_star)?;

    let report = CbsReport {
        input_events: events.len() as u64,
        truncated_events: tables.truncated_events,
        calibration_events: tables.calibration_events,
        holdout_events: tables.holdout_events,
        customers: rows.len() as u64,
    };
    log_finish(&report);

    Ok((rows, report))
}

fn validate_config(cfg: &CbsConfig) -> Result<(), CbsError> {
    if cfg.days_in_period == 0 {
        return Err(CbsError::InvalidConfig(
            "days_in_period must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn parse_boundary(field: &'static str, value: Option<&str>) -> Result<Option<i64>, CbsError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(raw, BOUNDARY_DATE_FORMAT).map_err(|_| {
        CbsError::InvalidDateFormat {
            field,
            value: raw.to_string(),
        }
    })?;
    Ok(Some(day_start_ts(date)))
}

fn normalize_events<C>(events: &[Event<C>]) -> Result<Vec<NormalizedEvent<'_, C>>, CbsError> {
    let mut out = Vec::with_capacity(events.len());
    for event in events {
        out.push(NormalizedEvent {
            customer_id: &event.customer_id,
            ts: event_date_ts(event.date)?,
            sales: event.sales,
        });
    }
    Ok(out)
}

fn event_date_ts(date: u32) -> Result<i64, CbsError> {
    // Eight digits exactly; shorter values are ambiguous, not year-zero-padded.
    if !(10_000_000..=99_999_999).contains(&date) {
        return Err(CbsError::MalformedEvent { date });
    }
    let year = (date / 10_000) as i32;
    let month = (date / 100) % 100;
    let day = date % 100;
    let parsed =
        NaiveDate::from_ymd_opt(year, month, day).ok_or(CbsError::MalformedEvent { date })?;
    Ok(day_start_ts(parsed))
}

fn day_start_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight should exist for any calendar date")
        .and_utc()
        .timestamp()
}

fn split_periods<'a, C: Ord>(
    events: &[NormalizedEvent<'a, C>],
    calibration_end_ts: i64,
    observation_end_ts: i64,
) -> PeriodTables<'a, C> {
    let mut tables = PeriodTables {
        calibration: BTreeMap::new(),
        holdout: BTreeMap::new(),
        truncated_events: 0,
        calibration_events: 0,
        holdout_events: 0,
    };

    for event in events {
        if event.ts > observation_end_ts {
            tables.truncated_events += 1;
        } else if event.ts > calibration_end_ts {
            tables.holdout_events += 1;
            let summary = tables.holdout.entry(event.customer_id).or_insert(HoldoutSummary {
                x_star: 0,
                sales_star: 0.0,
            });
            // Holdout activity counts raw transactions, unlike the
            // period-collapsed calibration side.
            summary.x_star += 1;
            summary.sales_star += event.sales;
        } else {
            tables.calibration_events += 1;
            *tables
                .calibration
                .entry(event.customer_id)
                .or_default()
                .entry(event.ts)
                .or_insert(0.0) += event.sales;
        }
    }

    tables
}

fn summarize_customer(periods: &BTreeMap<i64, f64>, mult: f64) -> CalibrationSummary {
    let first_ts = *periods
        .keys()
        .next()
        .expect("calibration entries are only created with at least one period");

    let mut prev_t = 0i64;
    let mut last_t = 0i64;
    let mut sales = 0.0;
    let mut litt = 0.0;
    for (&ts, &sales_sum) in periods {
        let t = ts - first_ts;
        let itt = t - prev_t;
        // The first period has no predecessor, so its gap is zero by
        // construction and contributes nothing, never a log of zero.
        if itt != 0 {
            litt += (itt as f64 / mult).ln();
        }
        sales += sales_sum;
        prev_t = t;
        last_t = t;
    }

    CalibrationSummary {
        first_ts,
        t_x: last_t as f64 / mult,
        sales,
        litt,
        x: (periods.len() - 1) as u64,
    }
}

fn merge_summaries<C: Ord + Clone>(
    calibration: &BTreeMap<&C, BTreeMap<i64, f64>>,
    holdout: &BTreeMap<&C, HoldoutSummary>,
    mult: f64,
    t_star: f64,
) -> Result<Vec<CbsRow<C>>, CbsError> {
    let mut rows = Vec::with_capacity(calibration.len());

    for (&customer_id, periods) in calibration {
        let summary = summarize_customer(periods, mult);
        let (x_star, sales_star) = holdout
            .get(customer_id)
            .map(|h| (h.x_star, h.sales_star))
            .unwrap_or((0, 0.0));
        let first = Utc
            .timestamp_opt(summary.first_ts, 0)
            .single()
            .ok_or(CbsError::InvalidTimestamp(summary.first_ts))?;

        rows.push(CbsRow {
            customer_id: customer_id.clone(),
            first,
            t_x: summary.t_x,
            sales: summary.sales,
            litt: summary.litt,
            x: summary.x,
            x_star,
            sales_star,
            t_star,
        });
    }

    Ok(rows)
}

fn log_finish(report: &CbsReport) {
    info!(
        component = "cbs",
        event = "cbs.transform.finish",
        input_events = report.input_events,
        truncated_events = report.truncated_events,
        calibration_events = report.calibration_events,
        holdout_events = report.holdout_events,
        customers = report.customers
    );
}
