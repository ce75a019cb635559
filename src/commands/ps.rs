//! `ps`: tabular container listing (spec.md §6, §11 supplement).
//!
//! No tabwriter dependency is pulled in for this: column widths are
//! computed by hand the way a small CLI tool would, not via an
//! additional crate for a single listing command.

use crate::state::{self, ContainerStatus};

const COLUMNS: &[&str] = &["ID", "NAME", "IMAGE", "PID", "STATUS", "COMMAND", "CREATED"];

pub fn ps(all: bool) {
    let mut containers = state::list_containers();
    containers.sort_by(|a, b| a.create_at.cmp(&b.create_at));

    let rows: Vec<[String; 7]> = containers
        .iter()
        .filter(|c| all || c.status == ContainerStatus::Running)
        .map(|c| {
            [
                c.short_id().to_string(),
                c.name.clone(),
                c.image_name.clone(),
                c.pid.to_string(),
                c.status.to_string(),
                c.cmds.join(" "),
                c.create_at.clone(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = COLUMNS.iter().map(|c| c.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    print_row(COLUMNS.iter().map(|s| s.to_string()).collect::<Vec<_>>().as_slice(), &widths);
    for row in &rows {
        print_row(row, &widths);
    }
}

fn print_row(cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    println!("{}", line.join("  ").trim_end());
}
