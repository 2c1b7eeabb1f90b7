use ndarray::{Array3, Array4, ArrayViewMut3, Axis};
use rayon::prelude::*;

use crate::board::{Piece, Snapshot, Square, NUM_CHANNELS};

/// One-hot occupancy encoder producing `(12, 8, 8)` tensors
///
/// Channel order is white P,R,N,B,Q,K then black p,r,n,b,q,k; row 0 is rank 8.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoardEncoder;

impl BoardEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a single snapshot
    pub fn encode(&self, snapshot: &Snapshot) -> Array3<u8> {
        let mut tensor = Array3::zeros((NUM_CHANNELS, 8, 8));
        self.encode_into(snapshot, tensor.view_mut());
        tensor
    }

    /// Encode into an existing `(12, 8, 8)` view, overwriting its contents
    pub fn encode_into(&self, snapshot: &Snapshot, mut out: ArrayViewMut3<u8>) {
        out.fill(0);
        for (square, piece) in snapshot.pieces() {
            out[[piece.channel(), square.row(), square.col()]] = 1;
        }
    }

    /// Encode a time-ordered sequence into `(time, 12, 8, 8)`
    pub fn encode_sequence(&self, snapshots: &[Snapshot]) -> Array4<u8> {
        let mut tensor = Array4::zeros((snapshots.len(), NUM_CHANNELS, 8, 8));
        for (t, snapshot) in snapshots.iter().enumerate() {
            self.encode_into(snapshot, tensor.index_axis_mut(Axis(0), t));
        }
        tensor
    }

    /// Encode many independent snapshots in parallel
    pub fn encode_batch(&self, snapshots: &[Snapshot]) -> Vec<Array3<u8>> {
        snapshots
            .par_iter()
            .map(|snapshot| self.encode(snapshot))
            .collect()
    }

    /// Rebuild the FEN placement field from an occupancy tensor
    ///
    /// Returns `None` when a square is claimed by more than one channel.
    pub fn decode_placement(&self, tensor: &Array3<u8>) -> Option<String> {
        let mut snapshot = Snapshot::empty();
        for square in Square::all() {
            let mut found = None;
            for channel in 0..NUM_CHANNELS {
                if tensor[[channel, square.row(), square.col()]] != 0 {
                    if found.is_some() {
                        return None;
                    }
                    found = Piece::from_channel(channel);
                }
            }
            snapshot.put(square, found);
        }
        Some(snapshot.placement())
    }
}
