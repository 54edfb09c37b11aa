use crate::types::{ConversionDirection, OptionsError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Substituted when automatic DPI detection fails
pub const DEFAULT_DPI: u32 = 150;
pub const MIN_DPI: u32 = 72;
pub const MAX_DPI: u32 = 1200;

/// Rendering resolution requested for a batch.
///
/// Stored as a bare integer where `0` means "detect per file".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "u32", into = "u32"))]
pub enum DpiSetting {
    /// Ask the engine for the document's native resolution
    Auto,
    Fixed(u32),
}

impl From<u32> for DpiSetting {
    fn from(value: u32) -> Self {
        if value == 0 {
            DpiSetting::Auto
        } else {
            DpiSetting::Fixed(value)
        }
    }
}

impl From<DpiSetting> for u32 {
    fn from(value: DpiSetting) -> Self {
        match value {
            DpiSetting::Auto => 0,
            DpiSetting::Fixed(dpi) => dpi,
        }
    }
}

/// Options applied to every file of a run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConversionOptions {
    pub direction: ConversionDirection,
    pub dpi: DpiSetting,
    /// JPEG quality, 1-100
    pub quality: u8,
    pub lossless: bool,
    /// Let the engine write PDF → CBZ output straight to disk
    pub direct_to_disk: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            direction: ConversionDirection::PdfToArchive,
            dpi: DpiSetting::Auto,
            quality: 98,
            lossless: false,
            direct_to_disk: false,
        }
    }
}

impl ConversionOptions {
    /// Load options from JSON file
    #[cfg(feature = "serde")]
    pub async fn load(path: impl AsRef<std::path::Path>) -> Result<Self, OptionsError> {
        let bytes = tokio::fs::read(path).await?;
        let options: Self = serde_json::from_slice(&bytes)
            .map_err(|e| OptionsError::Parse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Save options to JSON file
    #[cfg(feature = "serde")]
    pub async fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), OptionsError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| OptionsError::Parse(e.to_string()))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(1..=100).contains(&self.quality) {
            return Err(OptionsError::Invalid(format!(
                "Quality must be between 1 and 100, got {}",
                self.quality
            )));
        }

        if let DpiSetting::Fixed(dpi) = self.dpi {
            if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
                return Err(OptionsError::Invalid(format!(
                    "DPI must be between {MIN_DPI} and {MAX_DPI}, got {dpi}"
                )));
            }
        }

        Ok(())
    }
}
