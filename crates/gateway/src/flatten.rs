use popgate_contracts::{ExportMode, OutputSink};

/// Zips the population table's columns with its first row, truncated to the
/// shorter of the two. A missing table, column list or row flattens to an
/// empty map.
pub fn flatten_populations(sink: &OutputSink) -> serde_json::Map<String, serde_json::Value> {
    let Some(table) = sink.table(ExportMode::Population) else {
        return serde_json::Map::new();
    };

    let first_row = table.rows.first().map(Vec::as_slice).unwrap_or(&[]);

    table
        .columns
        .iter()
        .zip(first_row)
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use popgate_contracts::ResultTable;
    use serde_json::json;

    fn sink(columns: &[&str], rows: Vec<Vec<serde_json::Value>>) -> OutputSink {
        let mut sink = OutputSink::new();
        sink.insert(
            ExportMode::Population,
            ResultTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        sink
    }

    #[test]
    fn matching_shapes_flatten_in_column_order() {
        let flat = flatten_populations(&sink(
            &["sessions", "time_played"],
            vec![vec![json!(10), json!(3600)]],
        ));

        assert_eq!(
            serde_json::Value::Object(flat),
            json!({ "sessions": 10, "time_played": 3600 })
        );
    }

    #[test]
    fn mismatched_shapes_truncate_to_the_shorter_side() {
        let more_columns = flatten_populations(&sink(&["a", "b", "c"], vec![vec![json!(1)]]));
        assert_eq!(more_columns.len(), 1);
        assert_eq!(more_columns["a"], json!(1));

        let more_values = flatten_populations(&sink(
            &["a", "b"],
            vec![vec![json!(1), json!(2), json!(3)]],
        ));
        assert_eq!(more_values.len(), 2);
        assert_eq!(more_values["b"], json!(2));
    }

    #[test]
    fn only_the_first_row_is_consumed() {
        let flat = flatten_populations(&sink(&["a"], vec![vec![json!(1)], vec![json!(2)]]));
        assert_eq!(flat["a"], json!(1));
    }

    #[test]
    fn absent_pieces_flatten_to_empty() {
        assert!(flatten_populations(&OutputSink::new()).is_empty());
        assert!(flatten_populations(&sink(&[], vec![vec![]])).is_empty());
        assert!(flatten_populations(&sink(&["a"], vec![])).is_empty());
        assert!(flatten_populations(&sink(&["a"], vec![vec![]])).is_empty());
    }

    #[test]
    fn flattened_column_order_is_preserved() {
        let flat = flatten_populations(&sink(
            &["zeta", "alpha", "mid"],
            vec![vec![json!(1), json!(2), json!(3)]],
        ));
        let keys = flat.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }
}
