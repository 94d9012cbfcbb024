//! Redaction configuration
//!
//! Loaded from JSON by the host. Every field has a default, so `{}` is a
//! valid configuration.

use crate::error::RedactError;
use serde::{Deserialize, Serialize};

/// Opaque RGB colour with components in the 0-1 range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parse `#RRGGBB` or `RRGGBB`
    pub fn from_hex(color: &str) -> Result<Self, RedactError> {
        let hex = color.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(RedactError::InvalidConfig(format!(
                "Colour must be #RRGGBB, got {:?}",
                color
            )));
        }
        let channel = |range: std::ops::Range<usize>| -> Result<f32, RedactError> {
            u8::from_str_radix(&hex[range], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| RedactError::InvalidConfig(format!("Invalid hex colour {:?}", color)))
        };
        Ok(Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    /// 8-bit RGBA with the given alpha in 0-1
    pub fn to_rgba8(self, alpha: f32) -> [u8; 4] {
        let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [to_byte(self.r), to_byte(self.g), to_byte(self.b), to_byte(alpha)]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedactConfig {
    /// Fill for committed redactions, on screen and in the exported file
    pub fill_color: String,
    /// Overlay alpha for committed redactions. Cosmetic only: export always
    /// paints at full opacity.
    pub preview_opacity: f32,
    /// Overlay colour of the rectangle being dragged
    pub draft_color: String,
    /// Remove glyphs under redactions from page content streams
    pub scrub_text: bool,
    /// Drop annotations whose rectangle intersects a redaction
    pub remove_covered_annotations: bool,
    /// Flate-compress rewritten content streams
    pub compress_content: bool,
}

impl Default for RedactConfig {
    fn default() -> Self {
        Self {
            fill_color: "#000000".to_string(),
            preview_opacity: 1.0,
            draft_color: "#FF0000".to_string(),
            scrub_text: true,
            remove_covered_annotations: true,
            compress_content: true,
        }
    }
}

impl RedactConfig {
    pub fn from_json(json: &str) -> Result<Self, RedactError> {
        let config: RedactConfig = serde_json::from_str(json)
            .map_err(|e| RedactError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RedactError> {
        Rgb::from_hex(&self.fill_color)?;
        Rgb::from_hex(&self.draft_color)?;
        if !(self.preview_opacity > 0.0 && self.preview_opacity <= 1.0) {
            return Err(RedactError::InvalidConfig(format!(
                "preview_opacity must be in (0, 1], got {}",
                self.preview_opacity
            )));
        }
        Ok(())
    }

    pub fn fill_rgb(&self) -> Result<Rgb, RedactError> {
        Rgb::from_hex(&self.fill_color)
    }

    pub fn draft_rgb(&self) -> Result<Rgb, RedactError> {
        Rgb::from_hex(&self.draft_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = RedactConfig::from_json("{}").unwrap();
        assert_eq!(config, RedactConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            RedactConfig::from_json(r##"{"fill_color":"#FFFFFF","scrub_text":false}"##).unwrap();
        assert_eq!(config.fill_color, "#FFFFFF");
        assert!(!config.scrub_text);
        assert!(config.remove_covered_annotations);
    }

    #[test]
    fn test_rejects_bad_colour() {
        let err = RedactConfig::from_json(r#"{"fill_color":"black"}"#).unwrap_err();
        assert!(matches!(err, RedactError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_zero_opacity() {
        let config = RedactConfig {
            preview_opacity: 0.0,
            ..RedactConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_hex_colour() {
        let rgb = Rgb::from_hex("#FF0000").unwrap();
        assert_eq!(rgb, Rgb { r: 1.0, g: 0.0, b: 0.0 });
        assert_eq!(Rgb::from_hex("00ff00").unwrap().g, 1.0);
        assert!(Rgb::from_hex("#FFF").is_err());
        assert!(Rgb::from_hex("#GG0000").is_err());
    }

    #[test]
    fn test_rgba8_conversion() {
        assert_eq!(Rgb::BLACK.to_rgba8(1.0), [0, 0, 0, 255]);
        assert_eq!(Rgb::from_hex("#FFFFFF").unwrap().to_rgba8(0.5), [255, 255, 255, 128]);
    }
}
