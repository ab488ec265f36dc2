use crate::dashboards::{DashboardDef, LoadOutcome};
use chrono::NaiveDateTime;

/// Renders a dashboard's headline numbers as plain text.
///
/// A failed or empty load renders the dashboard's failure message, followed
/// by the underlying error when there is one.
pub fn render(def: &DashboardDef, outcome: &LoadOutcome, generated_at: NaiveDateTime) -> String {
    let mut lines: Vec<String> = Vec::new();

    if outcome.table.is_empty() {
        lines.push(def.failure_message.to_string());
        if let Some(err) = &outcome.error {
            lines.push(format!("Error: {}", err));
        }
        return lines.join("\n");
    }

    lines.push(def.title.to_string());
    lines.push(format!("Last updated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")));
    lines.push(String::new());

    let kpis = def.kpis(&outcome.table);
    let width = kpis.iter().map(|k| k.label.len()).max().unwrap_or(0);
    for kpi in &kpis {
        lines.push(format!("{:<width$} | {}", kpi.label, kpi.value, width = width));
    }
    lines.join("\n")
}
