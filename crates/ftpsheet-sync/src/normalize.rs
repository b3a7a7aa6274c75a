use ftpsheet_core::{Cell, Table};
use tracing::{debug, warn};

/// Caps the table at `max_columns` and replaces non-finite numbers with
/// [`Cell::Empty`]. Every other cell passes through untouched.
pub fn normalize(table: Table, max_columns: usize) -> Table {
    let original_width = table.column_count();
    let (mut headers, rows) = table.into_parts();

    if original_width > max_columns {
        warn!(
            columns = original_width,
            kept = max_columns,
            "table wider than write window; dropping trailing columns"
        );
        headers.truncate(max_columns);
    }

    let mut replaced = 0usize;
    let rows = rows
        .into_iter()
        .map(|mut row| {
            row.truncate(max_columns);
            for cell in row.iter_mut() {
                if let Cell::Number(n) = cell {
                    if !n.is_finite() {
                        *cell = Cell::Empty;
                        replaced += 1;
                    }
                }
            }
            row
        })
        .collect();

    if replaced > 0 {
        debug!(replaced, "non-finite values blanked");
    }
    Table::new(headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftpsheet_core::MAX_COLUMNS;

    #[test]
    fn wide_table_is_cut_to_first_columns() {
        let headers: Vec<String> = (0..30).map(|i| format!("c{i}")).collect();
        let row: Vec<Cell> = (0..30).map(|i| Cell::Number(i as f64)).collect();
        let table = normalize(Table::new(headers, vec![row]), MAX_COLUMNS);

        assert_eq!(table.column_count(), 26);
        assert_eq!(table.headers().last().map(String::as_str), Some("c25"));
        assert_eq!(table.rows()[0].len(), 26);
        assert_eq!(table.rows()[0][25], Cell::Number(25.0));
    }

    #[test]
    fn infinities_and_nan_become_empty_and_nothing_else_changes() {
        let table = Table::new(
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            vec![
                vec![
                    Cell::Number(f64::INFINITY),
                    Cell::text("keep"),
                    Cell::Number(f64::NEG_INFINITY),
                    Cell::Number(1.5),
                ],
                vec![Cell::Number(f64::NAN), Cell::Empty, Cell::text(""), Cell::Number(-0.0)],
            ],
        );
        let table = normalize(table, MAX_COLUMNS);

        assert_eq!(
            table.rows()[0],
            vec![Cell::Empty, Cell::text("keep"), Cell::Empty, Cell::Number(1.5)]
        );
        assert_eq!(
            table.rows()[1],
            vec![Cell::Empty, Cell::Empty, Cell::text(""), Cell::Number(-0.0)]
        );
    }

    #[test]
    fn narrow_table_keeps_its_shape() {
        let table = Table::new(vec!["only".into()], vec![vec![Cell::text("x")], vec![]]);
        let normalized = normalize(table.clone(), MAX_COLUMNS);
        assert_eq!(normalized, table);
    }
}
