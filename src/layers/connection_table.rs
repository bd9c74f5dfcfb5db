//! Channel connectivity between a layer's input and output feature maps.

use crate::error::{NetworkError, Result};

/// Boolean adjacency between input channels (rows) and output channels
/// (columns), stored row-major.
///
/// The empty table (0 × 0) means "fully connected" and answers `true` for
/// every query.
///
/// # Example
///
/// ```
/// use tiny_convnet::layers::ConnectionTable;
///
/// // 2 input channels, 3 output channels
/// let table = ConnectionTable::new(&[
///     true, false, true,
///     false, true, true,
/// ], 2, 3).unwrap();
/// assert!(table.is_connected(0, 2));
/// assert!(!table.is_connected(1, 0));
/// assert!(ConnectionTable::full().is_connected(17, 4));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionTable {
    connected: Vec<bool>,
    rows: usize,
    cols: usize,
}

impl ConnectionTable {
    /// `rows` = input channels, `cols` = output channels.
    pub fn new(connected: &[bool], rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(NetworkError::InvalidConnectionTable(format!(
                "table must have at least one row and column, got {}x{}",
                rows, cols
            )));
        }
        if connected.len() != rows * cols {
            return Err(NetworkError::InvalidConnectionTable(format!(
                "expected {} entries for a {}x{} table, got {}",
                rows * cols,
                rows,
                cols,
                connected.len()
            )));
        }
        Ok(Self {
            connected: connected.to_vec(),
            rows,
            cols,
        })
    }

    /// The fully-connected sentinel.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 && self.cols == 0
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_connected(&self, in_channel: usize, out_channel: usize) -> bool {
        self.is_empty() || self.connected[in_channel * self.cols + out_channel]
    }

    /// Check that a non-empty table matches the layer's channel counts.
    pub fn validate(&self, in_channels: usize, out_channels: usize) -> Result<()> {
        if self.is_empty() || (self.rows == in_channels && self.cols == out_channels) {
            Ok(())
        } else {
            Err(NetworkError::InvalidConnectionTable(format!(
                "table is {}x{} but layer has {} input and {} output channels",
                self.rows, self.cols, in_channels, out_channels
            )))
        }
    }

    /// Number of connected (input, output) channel pairs for the given counts.
    pub fn connected_pairs(&self, in_channels: usize, out_channels: usize) -> usize {
        if self.is_empty() {
            in_channels * out_channels
        } else {
            self.connected.iter().filter(|&&c| c).count()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_connects_everything() {
        let table = ConnectionTable::full();
        assert!(table.is_empty());
        for x in 0..20 {
            for y in 0..20 {
                assert!(table.is_connected(x, y));
            }
        }
        assert_eq!(table.connected_pairs(6, 16), 96);
    }

    #[test]
    fn test_wrong_entry_count_rejected() {
        let err = ConnectionTable::new(&[true, false, true], 2, 2).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidConnectionTable(_)));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(ConnectionTable::new(&[], 0, 3).is_err());
    }

    #[test]
    fn test_validate_against_channels() {
        let table = ConnectionTable::new(&[true; 6], 2, 3).unwrap();
        assert!(table.validate(2, 3).is_ok());
        assert!(table.validate(3, 2).is_err());
        assert!(ConnectionTable::full().validate(7, 9).is_ok());
    }
}
