//! Plain-text rendering of check results and dry-run plans

use crate::config::ServiceSpec;
use crate::monitor::ServiceReport;

const HEADERS: [&str; 5] = ["Service", "Status", "Response Time", "Code", "Error"];

/// Render one row per service as an aligned table
pub fn render_table(reports: &[ServiceReport]) -> String {
    let rows: Vec<[String; 5]> = reports.iter().map(row).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(str::to_string), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(rule.join("  ").as_str());
    out.push('\n');
    for row in &rows {
        push_line(&mut out, row, &widths);
    }
    out
}

/// List what would be watched, without touching the network
pub fn render_plan(specs: &[&ServiceSpec]) -> String {
    let mut out = String::new();
    for spec in specs {
        out.push_str(&format!(
            "  - {}: {} {} (every {}s, timeout {}s, threshold {})\n",
            spec.name,
            spec.method,
            spec.url,
            spec.interval.as_secs(),
            spec.timeout.as_secs(),
            spec.failure_threshold
        ));
    }
    out
}

fn row(report: &ServiceReport) -> [String; 5] {
    let result = report.last_result.as_ref();
    [
        report.name.clone(),
        report.status.to_string(),
        result
            .and_then(|r| r.latency)
            .map(|l| format!("{:.1}ms", l.as_secs_f64() * 1000.0))
            .unwrap_or_else(|| "-".to_string()),
        result
            .and_then(|r| r.status_code)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string()),
        result
            .and_then(|r| r.error.clone())
            .unwrap_or_else(|| "-".to_string()),
    ]
}

fn push_line(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}
