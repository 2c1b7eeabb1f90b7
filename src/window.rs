use crate::errors::{ExtractionError, Result};

/// Half-open ply range `[min_ply, max_ply)` retained for feature extraction
///
/// Early plies are dropped because openings are often memorised; late plies
/// are dropped to bound the time dimension of the output tensors.
///
/// Only [`PlyWindow::new`] builds one, so `min_ply < max_ply` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlyWindow {
    min_ply: usize,
    max_ply: usize,
}

impl PlyWindow {
    pub fn new(min_ply: usize, max_ply: usize) -> Result<Self> {
        if min_ply >= max_ply {
            return Err(ExtractionError::Configuration(format!(
                "ply window [{min_ply}, {max_ply}) is empty"
            )));
        }
        Ok(Self { min_ply, max_ply })
    }

    pub fn min_ply(&self) -> usize {
        self.min_ply
    }

    pub fn max_ply(&self) -> usize {
        self.max_ply
    }

    /// Fixed time dimension of stacked tensors
    pub fn len(&self) -> usize {
        self.max_ply - self.min_ply
    }

    pub fn contains(&self, ply: usize) -> bool {
        (self.min_ply..self.max_ply).contains(&ply)
    }

    /// Items whose index falls in the window, truncated (never padded)
    pub fn select<'a, T>(&self, sequence: &'a [T]) -> &'a [T] {
        if sequence.len() <= self.min_ply {
            return &[];
        }
        &sequence[self.min_ply..sequence.len().min(self.max_ply)]
    }

    /// Like [`select`](Self::select), but an empty result is an
    /// [`ExtractionError::EmptyWindow`]
    pub fn select_nonempty<'a, T>(&self, sequence: &'a [T]) -> Result<&'a [T]> {
        let selected = self.select(sequence);
        if selected.is_empty() {
            return Err(ExtractionError::EmptyWindow {
                snapshots: sequence.len(),
                min_ply: self.min_ply,
                max_ply: self.max_ply,
            });
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_inside_sequence() {
        let window = PlyWindow::new(2, 8).unwrap();
        let plies: Vec<usize> = (0..10).collect();
        assert_eq!(window.select(&plies), &[2, 3, 4, 5, 6, 7]);
        assert_eq!(window.len(), 6);
    }

    #[test]
    fn test_short_game_is_empty() {
        let window = PlyWindow::new(5, 20).unwrap();
        let plies: Vec<usize> = (0..3).collect();
        assert!(window.select(&plies).is_empty());
        assert!(matches!(
            window.select_nonempty(&plies),
            Err(ExtractionError::EmptyWindow {
                snapshots: 3,
                min_ply: 5,
                max_ply: 20
            })
        ));
    }

    #[test]
    fn test_truncates_without_padding() {
        let window = PlyWindow::new(2, 8).unwrap();
        let plies: Vec<usize> = (0..5).collect();
        assert_eq!(window.select(&plies), &[2, 3, 4]);
    }

    #[test]
    fn test_length_equal_to_min_is_empty() {
        let window = PlyWindow::new(4, 8).unwrap();
        let plies: Vec<usize> = (0..4).collect();
        assert!(window.select(&plies).is_empty());
        let plies: Vec<usize> = (0..5).collect();
        assert_eq!(window.select_nonempty(&plies).unwrap(), &[4]);
    }

    #[test]
    fn test_rejects_empty_range() {
        assert!(PlyWindow::new(5, 5).is_err());
        assert!(PlyWindow::new(6, 5).is_err());
        let window = PlyWindow::new(0, 1).unwrap();
        assert!(window.contains(0));
        assert!(!window.contains(1));
    }
}
