//! The win-percentage table indexed by spread and unseen tiles.

use crate::error::{GameError, GameResult};

/// Win probabilities observed at given (final spread, tiles unseen)
/// pairs. Loaded from comma-separated text: a header line, then one
/// line per spread in descending order whose first column is the
/// spread and whose remaining columns are probabilities by unseen
/// count. Lookups clamp out-of-range inputs to the table edges.
#[derive(Debug, Clone)]
pub struct WinPct {
    win_pcts: Vec<Vec<f32>>,
    min_spread: i32,
    max_spread: i32,
    max_tiles_unseen: usize,
}

impl WinPct {
    /// Parses the comma-separated text format.
    pub fn from_csv(text: &str) -> GameResult<Self> {
        let mut rows = Vec::new();
        let mut spreads = Vec::new();
        let mut columns = 0;

        for line in text.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let mut items = line.split(',');
            let spread: i32 = items
                .next()
                .and_then(|s| s.trim().parse().ok())
                .ok_or(GameError::MalformedWinPct)?;
            let row: Vec<f32> = items
                .map(|s| s.trim().parse::<f32>().map_err(|_| GameError::MalformedWinPct))
                .collect::<GameResult<_>>()?;
            if rows.is_empty() {
                columns = row.len();
            } else if row.len() != columns {
                return Err(GameError::MalformedWinPct);
            }
            spreads.push(spread);
            rows.push(row);
        }
        if rows.is_empty() || columns == 0 {
            return Err(GameError::MalformedWinPct);
        }
        // Spreads must be continuous and descending.
        if spreads.windows(2).any(|w| w[0] - w[1] != 1) {
            return Err(GameError::MalformedWinPct);
        }

        Ok(Self {
            max_spread: spreads[0],
            min_spread: *spreads.last().unwrap(),
            max_tiles_unseen: columns - 1,
            win_pcts: rows,
        })
    }

    /// The win probability at a spread with a number of unseen tiles,
    /// clamped to the table edges.
    pub fn win_pct(&self, spread: i32, tiles_unseen: usize) -> f64 {
        let spread = spread.clamp(self.min_spread, self.max_spread);
        let unseen = tiles_unseen.min(self.max_tiles_unseen);
        self.win_pcts[(self.max_spread - spread) as usize][unseen] as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "spread,0,1,2\n\
                         2,1.0,0.95,0.9\n\
                         1,1.0,0.85,0.8\n\
                         0,0.5,0.5,0.5\n\
                         -1,0.0,0.15,0.2\n\
                         -2,0.0,0.05,0.1\n";

    #[test]
    fn lookups() {
        let wp = WinPct::from_csv(TABLE).unwrap();
        assert_eq!(wp.win_pct(0, 0), 0.5);
        assert!((wp.win_pct(1, 1) - 0.85).abs() < 1e-6);
        assert!((wp.win_pct(-2, 2) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn clamping() {
        let wp = WinPct::from_csv(TABLE).unwrap();
        assert_eq!(wp.win_pct(500, 0), 1.0);
        assert_eq!(wp.win_pct(-500, 0), 0.0);
        assert!((wp.win_pct(2, 99) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn malformed_tables() {
        assert!(WinPct::from_csv("header only\n").is_err());
        // Ragged columns.
        assert!(WinPct::from_csv("h\n1,0.5,0.5\n0,0.5\n").is_err());
        // Non-contiguous spreads.
        assert!(WinPct::from_csv("h\n5,0.9\n2,0.5\n").is_err());
    }
}
