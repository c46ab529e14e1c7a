//! Iteration data.
//!
//! A run may be parametrized by a parsed array of data rows. Each
//! iteration binds one row into the data scope. The source is finite and
//! lazy; it is restarted only by constructing a new value for the next
//! run, never by rewinding.

use crate::scope::Layer;

/// The rows that parametrize a run, with an optional visiting window.
#[derive(Debug, Clone, Default)]
pub struct IterationData {
    rows: Vec<Layer>,
    /// 0-based inclusive window into `rows`, normalized from the 1-based
    /// `[from, to]` exposed in the options.
    window: Option<(usize, usize)>,
}

impl IterationData {
    pub fn new(rows: Vec<Layer>) -> IterationData {
        IterationData { rows, window: None }
    }

    /// Restrict which rows are visited. `from`/`to` are 1-based and
    /// inclusive as exposed externally; out-of-range bounds are clamped to
    /// the data length. The window narrows row selection only; it never
    /// changes how many iterations the run performs.
    pub fn with_window(mut self, from: Option<usize>, to: Option<usize>) -> IterationData {
        if self.rows.is_empty() {
            return self;
        }
        let last = self.rows.len() - 1;
        let lo = from.map_or(0, |f| f.saturating_sub(1)).min(last);
        let hi = to.map_or(last, |t| t.saturating_sub(1)).min(last);
        if lo <= hi {
            self.window = Some((lo, hi));
        }
        self
    }

    fn window_len(&self) -> usize {
        match self.window {
            Some((lo, hi)) => hi - lo + 1,
            None => self.rows.len(),
        }
    }

    /// Number of iterations the run performs: the explicit iteration-count
    /// option wins, else the windowed row count, else 1.
    pub fn resolved_count(&self, explicit: Option<usize>) -> usize {
        if let Some(count) = explicit {
            return count;
        }
        match self.window_len() {
            0 => 1,
            n => n,
        }
    }

    /// The data row bound to iteration `i`, or `None` when no data was
    /// supplied. When the iteration count exceeds the windowed row count
    /// the index loops: row `window[i mod window_len]`.
    pub fn row(&self, i: usize) -> Option<&Layer> {
        let len = self.window_len();
        if len == 0 {
            return None;
        }
        let base = self.window.map_or(0, |(lo, _)| lo);
        self.rows.get(base + i % len)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn rows(n: usize) -> Vec<Layer> {
        (0..n)
            .map(|i| [("row".to_string(), json!(i))].into_iter().collect())
            .collect()
    }

    fn row_index(data: &IterationData, i: usize) -> i64 {
        data.row(i).unwrap()["row"].as_i64().unwrap()
    }

    #[test_case(None, 3, 3; "defaults to row count")]
    #[test_case(Some(5), 3, 5; "explicit count wins over data")]
    #[test_case(Some(2), 0, 2; "explicit count wins over empty data")]
    #[test_case(None, 0, 1; "no data and no count runs once")]
    fn resolved_count(explicit: Option<usize>, n_rows: usize, expected: usize) {
        let data = IterationData::new(rows(n_rows));
        assert_eq!(data.resolved_count(explicit), expected);
    }

    #[test]
    fn rows_loop_modulo_length() {
        let data = IterationData::new(rows(3));
        assert_eq!(row_index(&data, 0), 0);
        assert_eq!(row_index(&data, 2), 2);
        assert_eq!(row_index(&data, 3), 0);
        assert_eq!(row_index(&data, 7), 1);
    }

    #[test]
    fn empty_data_yields_no_rows() {
        let data = IterationData::new(Vec::new());
        assert_eq!(data.row(0), None);
        assert_eq!(data.row(5), None);
    }

    #[test]
    fn window_restricts_and_loops_within_bounds() {
        let data = IterationData::new(rows(5)).with_window(Some(2), Some(4));
        assert_eq!(data.resolved_count(None), 3);
        assert_eq!(row_index(&data, 0), 1);
        assert_eq!(row_index(&data, 2), 3);
        // Explicit count beyond the window loops inside it.
        assert_eq!(row_index(&data, 3), 1);
    }

    #[test]
    fn window_bounds_are_clamped() {
        let data = IterationData::new(rows(3)).with_window(Some(2), Some(10));
        assert_eq!(data.resolved_count(None), 2);
        assert_eq!(row_index(&data, 0), 1);
        assert_eq!(row_index(&data, 1), 2);
    }
}
