//! Review image slot index.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a slot index falls outside `1..=5`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("image slot must be between 1 and {max}, got {got}", max = ImageSlot::COUNT)]
pub struct ImageSlotError {
    /// The rejected value.
    pub got: i64,
}

/// One of the five fixed image positions on a review.
///
/// Slots are 1-based to match the `image_1` .. `image_5` columns. A value of
/// this type is always in range, so code that holds one never has to re-check.
///
/// ```
/// use dongne_core::ImageSlot;
///
/// let slot = ImageSlot::new(3).unwrap();
/// assert_eq!(slot.index(), 2);
/// assert!(ImageSlot::new(0).is_err());
/// assert!(ImageSlot::new(6).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ImageSlot(u8);

impl ImageSlot {
    /// Number of image slots on a review.
    pub const COUNT: usize = 5;

    /// Create a slot from its 1-based number.
    ///
    /// # Errors
    ///
    /// Returns [`ImageSlotError`] if `n` is not in `1..=5`.
    pub fn new(n: i64) -> Result<Self, ImageSlotError> {
        match u8::try_from(n) {
            Ok(v @ 1..=5) => Ok(Self(v)),
            _ => Err(ImageSlotError { got: n }),
        }
    }

    /// All slots in order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=5).map(Self)
    }

    /// The 1-based slot number.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Zero-based position for array storage.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// Name of the review column holding this slot's reference.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self.0 {
            1 => "image_1",
            2 => "image_2",
            3 => "image_3",
            4 => "image_4",
            _ => "image_5",
        }
    }
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for ImageSlot {
    type Error = ImageSlotError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

impl From<ImageSlot> for u8 {
    fn from(slot: ImageSlot) -> Self {
        slot.0
    }
}
