//! Session CSV loading.
//!
//! Expected columns: `timestamp`, `open`, `high`, `low`, `close`, `volume`,
//! plus any indicator series named as `Series::name` returns them
//! (`fast_osc`, `slow_osc`, `trend_ref`, `ma_short`, ...). Empty indicator
//! cells become NaN. Rows are split into one session per calendar date, and
//! each session after the first uses the last close of the previous one as
//! its previous close.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use sigflow_core::context::{IndicatorContext, Series};
use sigflow_core::domain::Bar;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const REQUIRED: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Session-level values supplied on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Levels {
    pub prev_close: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
}

/// One trading day, ready to replay.
#[derive(Debug, Clone)]
pub struct Session {
    pub date: NaiveDate,
    pub context: IndicatorContext,
}

/// One CSV line. `bar.index` is assigned once the session is known.
struct Row {
    bar: Bar,
    series: Vec<(Series, f64)>,
}

pub fn load_sessions(path: &Path, instrument_id: &str, levels: Levels) -> Result<Vec<Session>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    parse_sessions(file, instrument_id, levels)
        .with_context(|| format!("failed to load bars from {}", path.display()))
}

pub fn parse_sessions<R: Read>(
    reader: R,
    instrument_id: &str,
    levels: Levels,
) -> Result<Vec<Session>> {
    let rows = read_rows(reader)?;
    if rows.is_empty() {
        bail!("no bars in input");
    }

    let mut by_date: BTreeMap<NaiveDate, Vec<Row>> = BTreeMap::new();
    for row in rows {
        by_date.entry(row.bar.session_date()).or_default().push(row);
    }
    if by_date.len() > 1 && (levels.support.is_some() || levels.resistance.is_some()) {
        warn!(
            sessions = by_date.len(),
            "support/resistance apply to every session in the file"
        );
    }

    let mut sessions = Vec::with_capacity(by_date.len());
    let mut prev_close = levels.prev_close;
    for (date, mut rows) in by_date {
        rows.sort_by_key(|r| r.bar.timestamp);
        let context = build_context(instrument_id, &rows, prev_close, levels)
            .with_context(|| format!("invalid session {date}"))?;
        prev_close = context
            .latest_index()
            .and_then(|i| context.close(i))
            .or(prev_close);
        debug!(%date, bars = context.len(), "session loaded");
        sessions.push(Session { date, context });
    }
    Ok(sessions)
}

fn read_rows<R: Read>(reader: R) -> Result<Vec<Row>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let mut required = [0usize; 6];
    for (slot, name) in required.iter_mut().zip(REQUIRED) {
        *slot = position(name).with_context(|| format!("missing column '{name}'"))?;
    }

    let mut series_columns = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if REQUIRED.iter().any(|r| header.eq_ignore_ascii_case(r)) {
            continue;
        }
        match Series::from_name(&header.to_ascii_lowercase()) {
            Some(series) => series_columns.push((i, series)),
            None => warn!(column = header, "ignoring unknown column"),
        }
    }

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = line + 2;
        let field = |i: usize| record.get(i).unwrap_or("");

        let timestamp = parse_timestamp(field(required[0]))
            .with_context(|| format!("line {line}: bad timestamp '{}'", field(required[0])))?;
        let mut ohlcv = [0.0; 5];
        for (value, &col) in ohlcv.iter_mut().zip(&required[1..]) {
            *value = field(col).parse().with_context(|| {
                format!("line {line}: bad number '{}' in '{}'", field(col), &headers[col])
            })?;
        }

        let mut series = Vec::with_capacity(series_columns.len());
        for &(col, s) in &series_columns {
            let raw = field(col);
            let value = if raw.is_empty() {
                f64::NAN
            } else {
                raw.parse().with_context(|| {
                    format!("line {line}: bad number '{raw}' in '{}'", s.name())
                })?
            };
            series.push((s, value));
        }
        let [open, high, low, close, volume] = ohlcv;
        rows.push(Row {
            bar: Bar {
                index: 0,
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            },
            series,
        });
    }
    Ok(rows)
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn build_context(
    instrument_id: &str,
    rows: &[Row],
    prev_close: Option<f64>,
    levels: Levels,
) -> Result<IndicatorContext> {
    let bars: Vec<Bar> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| Bar {
            index,
            ..row.bar.clone()
        })
        .collect();
    let insane = bars.iter().filter(|b| !b.is_void() && !b.is_sane()).count();
    if insane > 0 {
        warn!(bars = insane, "bars with inconsistent OHLC values");
    }

    let mut columns: BTreeMap<Series, Vec<f64>> = BTreeMap::new();
    for row in rows {
        for &(series, value) in &row.series {
            columns.entry(series).or_default().push(value);
        }
    }

    let mut builder = IndicatorContext::builder(instrument_id, bars);
    for (series, values) in columns {
        builder = builder.series(series, values);
    }
    if let Some(v) = prev_close {
        builder = builder.prev_close(v);
    }
    if let Some(v) = levels.support {
        builder = builder.support(v);
    }
    if let Some(v) = levels.resistance {
        builder = builder.resistance(v);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DAYS: &str = "\
timestamp,open,high,low,close,volume,fast_osc,slow_osc
2024-06-03 09:30:00,10.0,10.3,9.9,10.2,1000,40,35
2024-06-03 09:31:00,10.2,10.4,10.1,10.3,1200,,36
2024-06-04 09:30:00,10.3,10.5,10.2,10.4,900,45,38
";

    #[test]
    fn splits_sessions_by_date() {
        let sessions = parse_sessions(TWO_DAYS.as_bytes(), "600519", Levels::default()).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].context.len(), 2);
        assert_eq!(sessions[1].context.len(), 1);
        assert_eq!(sessions[1].context.bar(0).unwrap().index, 0);
    }

    #[test]
    fn prev_close_carries_over() {
        let levels = Levels {
            prev_close: Some(9.8),
            ..Levels::default()
        };
        let sessions = parse_sessions(TWO_DAYS.as_bytes(), "600519", levels).unwrap();
        assert_eq!(sessions[0].context.prev_close(), Some(9.8));
        assert_eq!(sessions[1].context.prev_close(), Some(10.3));
    }

    #[test]
    fn empty_indicator_cell_is_missing() {
        let sessions = parse_sessions(TWO_DAYS.as_bytes(), "600519", Levels::default()).unwrap();
        let ctx = &sessions[0].context;
        assert_eq!(ctx.value(Series::FastOscillator, 0), Some(40.0));
        assert_eq!(ctx.value(Series::FastOscillator, 1), None);
        assert!(!ctx.has_series(Series::TrendReference));
    }

    #[test]
    fn levels_are_applied() {
        let levels = Levels {
            prev_close: None,
            support: Some(9.5),
            resistance: Some(11.0),
        };
        let sessions = parse_sessions(TWO_DAYS.as_bytes(), "600519", levels).unwrap();
        assert_eq!(sessions[0].context.support(), Some(9.5));
        assert_eq!(sessions[0].context.resistance(), Some(11.0));
    }

    #[test]
    fn unsorted_rows_are_ordered() {
        let csv = "\
timestamp,open,high,low,close,volume
2024-06-03T09:31,10.2,10.4,10.1,10.3,1200
2024-06-03T09:30,10.0,10.3,9.9,10.2,1000
";
        let sessions = parse_sessions(csv.as_bytes(), "600519", Levels::default()).unwrap();
        assert_eq!(sessions[0].context.close(0), Some(10.2));
    }

    #[test]
    fn missing_column_is_an_error() {
        let csv = "timestamp,open,high,low,close\n2024-06-03 09:30:00,1,1,1,1\n";
        let err = parse_sessions(csv.as_bytes(), "600519", Levels::default()).unwrap_err();
        assert!(format!("{err:#}").contains("volume"));
    }

    #[test]
    fn bad_number_names_the_line() {
        let csv = "timestamp,open,high,low,close,volume\n2024-06-03 09:30:00,1,x,1,1,1\n";
        let err = parse_sessions(csv.as_bytes(), "600519", Levels::default()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn empty_input_is_an_error() {
        let csv = "timestamp,open,high,low,close,volume\n";
        assert!(parse_sessions(csv.as_bytes(), "600519", Levels::default()).is_err());
    }
}
