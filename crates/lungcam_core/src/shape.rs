//! Image tensor shape metadata.

use serde::{Deserialize, Serialize};

use crate::config::{INPUT_CHANNELS, INPUT_SIZE};
use crate::error::{CoreError, Result};

/// Shape metadata for channels-last image tensors.
///
/// Follows the convention `(N, H, W, C)`:
/// - `N`: Batch size
/// - `H`: Height in pixels
/// - `W`: Width in pixels
/// - `C`: Color channels
///
/// # Example
///
/// ```rust
/// use lungcam_core::ImageShape;
///
/// let shape = ImageShape::model_input();
/// assert_eq!(shape.as_array(), [1, 256, 256, 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    batch: usize,
    height: usize,
    width: usize,
    channels: usize,
}

impl ImageShape {
    /// Create a new shape with the specified dimensions.
    #[must_use]
    pub const fn new(batch: usize, height: usize, width: usize, channels: usize) -> Self {
        Self {
            batch,
            height,
            width,
            channels,
        }
    }

    /// The fixed input contract of the classifier: `(1, 256, 256, 3)`.
    #[must_use]
    pub const fn model_input() -> Self {
        Self::new(1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS)
    }

    /// Get the batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Get the height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Get the width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Get the number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Convert to an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 4] {
        [self.batch, self.height, self.width, self.channels]
    }

    /// Fail unless `self` equals `expected`.
    pub fn ensure(&self, expected: &Self) -> Result<()> {
        if self != expected {
            return Err(CoreError::InvalidShape {
                expected: expected.to_string(),
                got: self.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(N={}, H={}, W={}, C={})",
            self.batch, self.height, self.width, self.channels
        )
    }
}

impl From<[usize; 4]> for ImageShape {
    fn from([batch, height, width, channels]: [usize; 4]) -> Self {
        Self::new(batch, height, width, channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_input_shape() {
        let shape = ImageShape::model_input();
        assert_eq!(shape.batch(), 1);
        assert_eq!(shape.height(), 256);
        assert_eq!(shape.width(), 256);
        assert_eq!(shape.channels(), 3);
    }

    #[test]
    fn test_shape_from_tensor_dims() {
        let shape = ImageShape::from([1, 32, 16, 3]);
        assert_eq!(shape.as_array(), [1, 32, 16, 3]);
        assert_eq!(shape.to_string(), "(N=1, H=32, W=16, C=3)");
    }

    #[test]
    fn test_shape_ensure() {
        let expected = ImageShape::model_input();
        assert!(expected.ensure(&ImageShape::model_input()).is_ok());

        let err = ImageShape::new(1, 224, 224, 3).ensure(&expected).unwrap_err();
        assert!(matches!(err, CoreError::InvalidShape { .. }));
        assert!(err.to_string().contains("H=224"));
    }

    #[test]
    fn test_shape_serialization() {
        let shape = ImageShape::new(1, 8, 8, 2048);
        let json = serde_json::to_string(&shape).unwrap();
        let restored: ImageShape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape, restored);
    }
}
