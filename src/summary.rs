use crate::charts::ChartSlot;
use crate::pipeline::ViewData;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_BORDERS_ONLY,
};

fn group_color(title: &str) -> Color {
    match title {
        "Ascending" | "Top Gainers" => Color::Green,
        "Descending" | "Top Losers" => Color::Red,
        _ => Color::Grey,
    }
}

/// Print the final classification table for the last rendered view.
pub fn print(data: &ViewData) {
    let title = format!(
        "{} — epoch {} — {} rendered / {} skipped / {} failed",
        data.view_name,
        data.epoch,
        data.report.rendered,
        data.report.skipped,
        data.report.failed.len()
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Group").add_attribute(Attribute::Bold),
            Cell::new("Symbol").add_attribute(Attribute::Bold),
            Cell::new("Angle")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("Samples")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("Last Close")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        ]);

    for group in &data.groups {
        let color = group_color(&group.title);
        for slot in &group.slots {
            match slot {
                ChartSlot::Chart(chart) => {
                    let angle = chart
                        .angle
                        .map(|a| format!("{a:.1}\u{b0}"))
                        .unwrap_or_else(|| "-".to_string());
                    let last = chart
                        .last_close()
                        .map(|c| format!("{c:.2}"))
                        .unwrap_or_else(|| "-".to_string());
                    table.add_row(vec![
                        Cell::new(&group.title).fg(color),
                        Cell::new(chart.symbol.as_str()),
                        Cell::new(angle).set_alignment(CellAlignment::Right),
                        Cell::new(chart.samples()).set_alignment(CellAlignment::Right),
                        Cell::new(last).set_alignment(CellAlignment::Right),
                    ]);
                }
                ChartSlot::Missing { symbol, reason } => {
                    table.add_row(vec![
                        Cell::new(&group.title).fg(color),
                        Cell::new(symbol.as_str()).fg(Color::DarkGrey),
                        Cell::new(reason.as_str()).fg(Color::Yellow),
                        Cell::new("-").set_alignment(CellAlignment::Right),
                        Cell::new("-").set_alignment(CellAlignment::Right),
                    ]);
                }
            }
        }
    }

    println!("\n{title}\n{table}");
}
