//! Plain-text report formatting

/// Title framed by `=` rules of the given width
pub fn banner(title: &str, width: usize) -> String {
    let rule = "=".repeat(width);
    format!("{rule}\n{title}\n{rule}")
}

/// `--- title ---` section heading
pub fn section(title: &str) -> String {
    format!("--- {title} ---")
}

#[cfg(feature = "database")]
pub use tables::render_table;

#[cfg(feature = "database")]
mod tables {
    use crate::analytics::ReportTable;

    /// Render a result table with one header row; numbers right-aligned
    pub fn render_table(table: &ReportTable) -> String {
        if table.rows.is_empty() {
            return "(no rows)".to_string();
        }

        let rendered: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        let widths: Vec<usize> = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                rendered
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        // Align a column by the kind of its first row
        let numeric: Vec<bool> = (0..table.columns.len())
            .map(|i| {
                table
                    .rows
                    .first()
                    .and_then(|row| row.get(i))
                    .is_some_and(|cell| cell.is_numeric())
            })
            .collect();

        let mut lines = Vec::with_capacity(table.rows.len() + 1);
        lines.push(format_line(
            table.columns.iter().map(String::as_str),
            &widths,
            &numeric,
        ));
        for row in &rendered {
            lines.push(format_line(row.iter().map(String::as_str), &widths, &numeric));
        }
        lines.join("\n")
    }

    fn format_line<'a>(
        cells: impl Iterator<Item = &'a str>,
        widths: &[usize],
        numeric: &[bool],
    ) -> String {
        cells
            .zip(widths.iter().zip(numeric))
            .map(|(cell, (&width, &right))| {
                if right {
                    format!("{cell:>width$}")
                } else {
                    format!("{cell:<width$}")
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner() {
        assert_eq!(banner("TITLE", 5), "=====\nTITLE\n=====");
        assert_eq!(section("1a. Overall"), "--- 1a. Overall ---");
    }

    #[cfg(feature = "database")]
    #[test]
    fn test_render_table_alignment() {
        use crate::analytics::{Cell, ReportTable};

        let table = ReportTable {
            title: "t".to_string(),
            columns: vec!["mid_module".to_string(), "apps".to_string()],
            rows: vec![
                vec![Cell::Text("B".to_string()), Cell::Int(7)],
                vec![Cell::Text("D".to_string()), Cell::Int(123)],
            ],
        };
        assert_eq!(
            render_table(&table),
            "mid_module  apps\nB              7\nD            123"
        );
    }
}
