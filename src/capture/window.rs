// WindowBuffer: growing row buffer sliced into fixed-size windows

use std::collections::VecDeque;

use crate::device::WindowRow;

/// Append-only accumulation of projected rows.
///
/// Rows are only ever removed from the front in whole windows, so
/// leftovers below the window size carry over to the next read.
#[derive(Debug, Default)]
pub struct WindowBuffer {
    rows: VecDeque<WindowRow>,
    window_rows: usize,
}

impl WindowBuffer {
    pub fn new(window_rows: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(window_rows * 2),
            window_rows,
        }
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = WindowRow>) {
        self.rows.extend(rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_window(&self) -> bool {
        self.window_rows > 0 && self.rows.len() >= self.window_rows
    }

    /// Remove exactly one window from the front, if enough rows are buffered
    pub fn pop_window(&mut self) -> Option<Vec<WindowRow>> {
        if !self.has_window() {
            return None;
        }
        Some(self.rows.drain(..self.window_rows).collect())
    }

    /// Put a window back at the front after a failed write
    pub fn restore_front(&mut self, window: Vec<WindowRow>) {
        for row in window.into_iter().rev() {
            self.rows.push_front(row);
        }
    }

    /// Drop any partial trailing rows
    pub fn clear(&mut self) -> usize {
        let dropped = self.rows.len();
        self.rows.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(range: std::ops::Range<usize>) -> Vec<WindowRow> {
        range
            .map(|i| WindowRow {
                timestamp: i as f64,
                values: [0.0; 4],
            })
            .collect()
    }

    #[test]
    fn test_windows_are_exact_and_leftovers_carry_over() {
        let mut buffer = WindowBuffer::new(100);
        buffer.extend(rows(0..60));
        assert!(buffer.pop_window().is_none());

        buffer.extend(rows(60..250));
        let first = buffer.pop_window().unwrap();
        let second = buffer.pop_window().unwrap();

        assert_eq!(first.len(), 100);
        assert_eq!(second[0].timestamp, 100.0);
        assert!(buffer.pop_window().is_none());
        assert_eq!(buffer.len(), 50);
    }

    #[test]
    fn test_restore_front_keeps_order() {
        let mut buffer = WindowBuffer::new(3);
        buffer.extend(rows(0..5));
        let window = buffer.pop_window().unwrap();
        buffer.restore_front(window);

        let again = buffer.pop_window().unwrap();
        let stamps: Vec<f64> = again.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_clear_reports_discarded_rows() {
        let mut buffer = WindowBuffer::new(10);
        buffer.extend(rows(0..7));
        assert_eq!(buffer.clear(), 7);
        assert!(buffer.is_empty());
    }
}
