//! Plain-text table rendering for query results.
//!
//! Output collaborator only: formats rows into a psql-style grid for the
//! pipeline binary. Nothing here touches the store.

/// Render headers and rows as a bordered text table.
///
/// ```
/// let table = trackstore::report::render_table(
///     &["User ID", "Count"],
///     &[vec!["010".to_string(), "3".to_string()]],
/// );
/// assert!(table.contains("| 010"));
/// ```
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().take(columns).enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let border = {
        let mut line = String::from("+");
        for width in &widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line
    };

    let format_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (i, width) in widths.iter().copied().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            line.push_str(&format!(" {cell:<width$} |"));
        }
        line
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    out.push_str(&format_row(&header_cells));
    out.push('\n');
    out.push_str(&border);
    out.push('\n');
    for row in rows {
        out.push_str(&format_row(row));
        out.push('\n');
    }
    out.push_str(&border);
    out
}

/// Print a titled table to stdout with a trailing blank line.
pub fn print_table(title: &str, headers: &[&str], rows: &[Vec<String>]) {
    println!("{title}");
    println!("{}", render_table(headers, rows));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_columns_to_the_widest_cell() {
        let table = render_table(
            &["User ID", "N"],
            &[
                vec!["010".to_string(), "12345".to_string()],
                vec!["0113".to_string(), "7".to_string()],
            ],
        );

        let lines: Vec<&str> = table.lines().collect();
        // Borders, header, two rows.
        assert_eq!(lines.len(), 6);
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
        assert!(lines[1].contains("User ID"));
        assert!(lines[4].contains("| 0113"));
    }

    #[test]
    fn empty_rows_still_render_a_grid() {
        let table = render_table(&["Mode"], &[]);
        assert_eq!(table.lines().count(), 4);
    }
}
