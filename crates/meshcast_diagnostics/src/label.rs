//! Labels that point a diagnostic at additional chips.

use meshcast_common::ChipCoord;
use serde::{Deserialize, Serialize};

/// A chip annotated with an explanatory message inside a diagnostic.
///
/// The primary location of a diagnostic is stored on the diagnostic itself;
/// labels name the other chips involved, such as the far end of a dead
/// link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// The chip this label refers to.
    pub chip: ChipCoord,
    /// The message shown next to the chip.
    pub message: String,
}

impl Label {
    /// Creates a label for `chip`.
    pub fn new(chip: ChipCoord, message: impl Into<String>) -> Self {
        Self {
            chip,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_label() {
        let label = Label::new(ChipCoord::new(1, 2), "far end of dead link");
        assert_eq!(label.chip, ChipCoord::new(1, 2));
        assert_eq!(label.message, "far end of dead link");
    }
}
