//! Resource limits for decoding.
//!
//! Checked against the frame header before any plane is allocated, so a
//! small malicious header cannot make the decoder reserve gigabytes.

use super::api::DecodeError;

/// Configuration for decode limits.
///
/// All limits are optional; `None` means unlimited.
///
/// # Example
///
/// ```rust
/// use zenvp8::Limits;
///
/// // Start with defaults and customize
/// let limits = Limits::default()
///     .max_dimensions(4096, 4096)
///     .max_total_pixels(8 * 1024 * 1024);
///
/// // Or start with no limits for trusted inputs
/// let unlimited = Limits::none();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Limits {
    /// Maximum image width in pixels.
    pub max_width: Option<u32>,

    /// Maximum image height in pixels.
    pub max_height: Option<u32>,

    /// Maximum total pixels (width * height).
    /// Useful for limiting memory even with odd aspect ratios.
    pub max_total_pixels: Option<u64>,
}

impl Default for Limits {
    /// 16384 x 16384, the format maximum, with no separate pixel cap. Every
    /// frame with a valid header passes.
    fn default() -> Self {
        Self {
            max_width: Some(16384),
            max_height: Some(16384),
            max_total_pixels: None,
        }
    }
}

impl Limits {
    /// Create limits with no restrictions.
    ///
    /// **Warning**: Only use this for trusted inputs!
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_total_pixels: None,
        }
    }

    /// Set maximum dimensions.
    #[must_use]
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Set maximum total pixels.
    #[must_use]
    pub fn max_total_pixels(mut self, pixels: u64) -> Self {
        self.max_total_pixels = Some(pixels);
        self
    }

    /// Check if dimensions are within limits.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), DecodeError> {
        if let Some(max_w) = self.max_width {
            if width > max_w {
                return Err(DecodeError::InvalidParameter(alloc::format!(
                    "width {} exceeds limit {}",
                    width,
                    max_w
                )));
            }
        }

        if let Some(max_h) = self.max_height {
            if height > max_h {
                return Err(DecodeError::InvalidParameter(alloc::format!(
                    "height {} exceeds limit {}",
                    height,
                    max_h
                )));
            }
        }

        let total_pixels = u64::from(width) * u64::from(height);
        if let Some(max_pixels) = self.max_total_pixels {
            if total_pixels > max_pixels {
                return Err(DecodeError::InvalidParameter(alloc::format!(
                    "total pixels {} exceeds limit {}",
                    total_pixels,
                    max_pixels
                )));
            }
        }

        Ok(())
    }
}
