use reconciliation::{AddOutcome, RefreshSummary};
use rust_decimal::Decimal;
use std::io::Write;
use valuation_core::{DisplayRow, TickerRecord};

fn cell(value: Option<Decimal>) -> String {
    value.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

fn percent(value: Option<Decimal>) -> String {
    value.map(|d| format!("{}%", d)).unwrap_or_else(|| "-".to_string())
}

pub fn render_table(records: &[TickerRecord]) -> String {
    let mut out = format!(
        "{:<8} {:<24} {:>10} {:>8} {:>10} {:>10} {:>8}  {}\n",
        "Ticker", "Name", "Price", "P/S", "Growth", "Target", "Upside", "Status"
    );
    for record in records {
        let row = DisplayRow::from(record);
        let name: String = row.name.chars().take(24).collect();
        out.push_str(&format!(
            "{:<8} {:<24} {:>10} {:>8} {:>10} {:>10} {:>8}  {}\n",
            row.ticker,
            name,
            cell(row.price),
            cell(row.ps_ratio),
            row.growth,
            cell(row.target_price),
            percent(row.upside_pct),
            row.status,
        ));
    }
    out
}

pub fn render_add(outcome: &AddOutcome) -> String {
    match outcome {
        AddOutcome::Valued(record) => {
            let row = DisplayRow::from(record);
            format!("Added {}: target {} ({} upside)", row.ticker, cell(row.target_price), percent(row.upside_pct))
        }
        AddOutcome::Unvalued { record, reason } => {
            format!("Added {} without a valuation: {}", record.ticker, reason)
        }
        AddOutcome::Placeholder { record, reason } => {
            format!("Added {} as a placeholder ({}); run refresh to fill it in", record.ticker, reason)
        }
    }
}

pub fn render_summary(summary: &RefreshSummary) -> String {
    let mut out = format!(
        "Refreshed {} of {} tickers",
        summary.refreshed.len(),
        summary.total
    );
    if !summary.rewritten {
        out.push_str(" (table unchanged)");
    }
    if !summary.unvalued.is_empty() {
        out.push_str(&format!("\n  updated without a valuation: {}", summary.unvalued.join(", ")));
    }
    for failure in &summary.failures {
        out.push_str(&format!("\n  {}: {}", failure.ticker, failure.error));
    }
    out
}

/// Rounded rows as CSV, header first.
pub fn write_csv<W: Write>(records: &[TickerRecord], writer: W) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(DisplayRow::from(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconciliation::TickerFailure;
    use rust_decimal_macros::dec;
    use valuation_core::{GrowthRates, RecordStatus, TrackerError};

    fn valued() -> TickerRecord {
        let mut record = TickerRecord::placeholder("AAPL", GrowthRates::new(vec![dec!(10), dec!(5)]).unwrap());
        record.name = Some("Apple Inc.".to_string());
        record.price = Some(dec!(187.456));
        record.ps_ratio = Some(dec!(7.18605));
        record.target_price = Some(dec!(201.3333));
        record.upside_pct = Some(dec!(7.40272));
        record.status = RecordStatus::Valued;
        record
    }

    #[test]
    fn test_csv_export_is_rounded() {
        let mut buf = Vec::new();
        write_csv(&[valued(), TickerRecord::placeholder("EVO", GrowthRates::default())], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ticker,name,currency,price"));
        assert!(lines[1].starts_with("AAPL,Apple Inc.,,187.46,"));
        assert!(lines[1].contains(",7.19,"));
        assert!(lines[1].contains(",201.33,7.4,ok"));
        assert!(lines[2].starts_with("EVO,,,,"));
    }

    #[test]
    fn test_table_marks_missing_values() {
        let table = render_table(&[TickerRecord::placeholder("EVO", GrowthRates::default())]);
        let row = table.lines().nth(1).unwrap();
        assert!(row.starts_with("EVO"));
        assert!(row.contains(" - "));
        assert!(row.ends_with("pending"));
    }

    #[test]
    fn test_summary_lists_failures() {
        let summary = RefreshSummary {
            total: 3,
            refreshed: vec!["MSFT".to_string()],
            unvalued: vec!["LOSS".to_string()],
            failures: vec![TickerFailure {
                ticker: "AAPL".to_string(),
                error: TrackerError::ProviderUnavailable("timeout".to_string()),
            }],
            rewritten: true,
        };
        let text = render_summary(&summary);
        assert!(text.starts_with("Refreshed 1 of 3 tickers"));
        assert!(text.contains("updated without a valuation: LOSS"));
        assert!(text.contains("AAPL: Provider unavailable: timeout"));
    }
}
