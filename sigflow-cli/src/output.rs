//! Rendering replay results as a table, JSON, or CSV.

use anyhow::{Context, Result};
use clap::ValueEnum;

use sigflow_core::domain::SignalEvent;

use crate::replay::SessionSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// Which events of a session to print.
fn events(summary: &SessionSummary, final_only: bool) -> &[SignalEvent] {
    if final_only {
        &summary.displayed
    } else {
        &summary.confirmed
    }
}

pub fn render(summaries: &[SessionSummary], format: OutputFormat, final_only: bool) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(summaries, final_only)),
        OutputFormat::Json => render_json(summaries, final_only),
        OutputFormat::Csv => render_csv(summaries, final_only),
    }
}

fn render_table(summaries: &[SessionSummary], final_only: bool) -> String {
    let mut out = String::new();
    for summary in summaries {
        out.push_str(&format!(
            "=== {} {} ({} bars) ===\n",
            summary.instrument_id, summary.date, summary.bars
        ));
        let rows = events(summary, final_only);
        if rows.is_empty() {
            out.push_str("  (no signals)\n");
        } else {
            out.push_str(&format!(
                "  {:<8} {:>5}  {:<4} {:<26} {:>9}  {}\n",
                "time", "bar", "side", "detector", "price", "note"
            ));
            for e in rows {
                let note = match (&e.fake_reason, e.wait_validate) {
                    (Some(reason), _) => format!("FAKE: {reason}"),
                    (None, true) => "awaiting re-validation".to_string(),
                    (None, false) => String::new(),
                };
                out.push_str(&format!(
                    "  {:<8} {:>5}  {:<4} {:<26} {:>9.3}  {}\n",
                    e.timestamp.format("%H:%M:%S"),
                    e.bar_index,
                    e.category,
                    e.detector,
                    e.price,
                    note
                ));
            }
        }
        out.push_str(&format!(
            "  confirmed: {}  removed: {}  discarded: {}  faults: {}",
            summary.confirmed.len(),
            summary.removed.len(),
            summary.discarded,
            summary.faults.len()
        ));
        if let Some(fp) = &summary.fingerprint {
            out.push_str(&format!("  config: {}", fp.short()));
        }
        out.push('\n');
        for fault in &summary.faults {
            out.push_str(&format!(
                "  fault: {} ({}) at bar {} during {:?}: {}\n",
                fault.detector, fault.category, fault.index, fault.stage, fault.message
            ));
        }
    }
    out
}

fn render_json(summaries: &[SessionSummary], final_only: bool) -> Result<String> {
    if !final_only {
        return serde_json::to_string_pretty(summaries).context("failed to serialize summaries");
    }
    let trimmed: Vec<SessionSummary> = summaries
        .iter()
        .map(|s| SessionSummary {
            confirmed: Vec::new(),
            removed: Vec::new(),
            ..s.clone()
        })
        .collect();
    serde_json::to_string_pretty(&trimmed).context("failed to serialize summaries")
}

fn render_csv(summaries: &[SessionSummary], final_only: bool) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "instrument",
        "date",
        "timestamp",
        "bar_index",
        "category",
        "detector",
        "price",
        "net_gain",
        "is_fake",
        "fake_reason",
    ])?;
    for summary in summaries {
        for e in events(summary, final_only) {
            wtr.write_record([
                summary.instrument_id.clone(),
                summary.date.to_string(),
                e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.bar_index.to_string(),
                e.category.to_string(),
                e.detector.clone(),
                format!("{:.4}", e.price),
                e.aux("net_gain").map(|g| format!("{g:.4}")).unwrap_or_default(),
                e.is_fake.to_string(),
                e.fake_reason.clone().unwrap_or_default(),
            ])?;
        }
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sigflow_core::domain::Category;

    fn summary() -> SessionSummary {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let ts = date.and_hms_opt(9, 44, 0).unwrap();
        let mut fake = SignalEvent::new("support_breakdown", Category::Sell, 3, ts, 9.5);
        fake.mark_fake("already down 7.00% from previous close");
        let plain = SignalEvent::new("consecutive_plunge", Category::Sell, 14, ts, 10.0)
            .with_aux("net_gain", -1.25);
        SessionSummary {
            date,
            instrument_id: "600519".into(),
            bars: 15,
            confirmed: vec![fake, plain.clone()],
            removed: vec![],
            displayed: vec![plain],
            discarded: 2,
            faults: vec![],
            fingerprint: None,
        }
    }

    #[test]
    fn table_lists_events_and_totals() {
        let out = render(&[summary()], OutputFormat::Table, false).unwrap();
        assert!(out.contains("600519 2024-06-03"));
        assert!(out.contains("FAKE: already down"));
        assert!(out.contains("confirmed: 2"));
        assert!(out.contains("discarded: 2"));
    }

    #[test]
    fn final_only_prints_displayed_events() {
        let out = render(&[summary()], OutputFormat::Csv, true).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("consecutive_plunge"));
        assert!(lines[1].contains("-1.2500"));
    }

    #[test]
    fn csv_has_header_and_all_rows() {
        let out = render(&[summary()], OutputFormat::Csv, false).unwrap();
        let header = out.lines().next().unwrap();
        assert!(header.starts_with("instrument,date,timestamp"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn json_final_only_drops_history() {
        let out = render(&[summary()], OutputFormat::Json, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["confirmed"].as_array().unwrap().len(), 0);
        assert_eq!(value[0]["displayed"].as_array().unwrap().len(), 1);
    }
}
