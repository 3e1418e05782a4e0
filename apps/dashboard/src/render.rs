use std::fmt::Write as _;

use client_core::{DashboardView, MachineView};

const HEADERS: [&str; 7] = [
    "MACHINE", "PROTOCOL", "PORT", "STATUS", "LATEST SAMPLE", "UPDATED", "ACTIONS",
];

fn row_cells(machine: &MachineView) -> [String; 7] {
    let protocol = match &machine.protocol_type {
        Some(kind) if !kind.is_empty() => format!("{} ({kind})", machine.protocol),
        _ => machine.protocol.clone(),
    };
    let (sample_id, updated) = match &machine.newest_sample {
        Some(sample) => (
            sample.sample_id.clone().unwrap_or_else(|| "-".to_string()),
            sample.display_time(),
        ),
        None => ("-".to_string(), "-".to_string()),
    };
    [
        machine.name.clone(),
        protocol,
        machine.port_display.clone(),
        machine.status.to_string(),
        sample_id,
        updated,
        actions(machine),
    ]
}

fn actions(machine: &MachineView) -> String {
    if machine.busy {
        return "(busy)".to_string();
    }
    let mut enabled = Vec::new();
    if machine.can_start() {
        enabled.push("start");
    }
    if machine.can_stop() {
        enabled.push("stop");
    }
    enabled.join(" ")
}

/// Plain-text table of the dashboard, followed by the loading and error lines.
pub fn render_dashboard(view: &DashboardView) -> String {
    let rows: Vec<[String; 7]> = view.machines.iter().map(row_cells).collect();
    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    write_row(&mut out, &HEADERS.map(str::to_string), &widths);
    for row in &rows {
        write_row(&mut out, row, &widths);
    }
    if rows.is_empty() && !view.loading {
        out.push_str("no machines configured\n");
    }
    if view.loading {
        out.push_str("loading...\n");
    }
    if let Some(error) = &view.error {
        let _ = writeln!(out, "error: {error}");
    }
    out
}

fn write_row(out: &mut String, cells: &[String; 7], widths: &[usize; 7]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}
