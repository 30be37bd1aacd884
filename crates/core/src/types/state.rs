//! Checkout state of a user's cart.

use serde::{Deserialize, Serialize};

/// Where a user's cart stands in the placement state machine.
///
/// ```text
/// Empty --add--> InCart --place--> Placed --add--> InCart ...
/// ```
///
/// `Placed` is terminal for one batch of orders; further cart activity opens
/// a fresh batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartState {
    /// No cart lines and nothing placed yet.
    Empty,
    /// At least one unplaced line.
    InCart,
    /// Cart is empty and the most recent batch has been placed.
    Placed,
}

impl CartState {
    /// Derive the state from the number of cart lines and whether any order
    /// has ever been placed.
    #[must_use]
    pub const fn from_counts(cart_lines: usize, has_placed: bool) -> Self {
        if cart_lines > 0 {
            Self::InCart
        } else if has_placed {
            Self::Placed
        } else {
            Self::Empty
        }
    }
}
