/// Image style transfer
///
/// Images are normalized locally (RGB, shorter side scaled to 512 pixels,
/// PNG) and the stylization itself runs on an external inference service.

mod client;

pub use client::HttpStyleTransfer;

use crate::{
    config::StyleConfig,
    error::{ParlorError, ParlorResult},
    metrics,
};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use std::{fmt, io::Cursor, str::FromStr, sync::Arc};

/// Length of the shorter image side sent for inference
pub const TARGET_SHORT_SIDE: u32 = 512;

/// Largest accepted ratio of the longer side to the shorter side
pub const MAX_ASPECT_RATIO: u32 = 4;

/// Available styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Mosaic,
    Candy,
    Udnie,
}

impl Style {
    pub const ALL: [Style; 3] = [Style::Mosaic, Style::Candy, Style::Udnie];

    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Mosaic => "mosaic",
            Style::Candy => "candy",
            Style::Udnie => "udnie",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = ParlorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParlorError::InvalidInput(format!("Style '{}' not found", s.trim())))
    }
}

/// Stylization collaborator
#[async_trait]
pub trait StyleTransfer: Send + Sync {
    /// Stylize a PNG image, returning encoded image bytes
    async fn stylize(&self, style: Style, png: Vec<u8>) -> ParlorResult<Vec<u8>>;
}

/// Decode any supported image and normalize it for inference
pub fn preprocess(bytes: &[u8]) -> ParlorResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ParlorError::InvalidInput(format!("Unreadable image: {}", e)))?;

    let (width, height) = img.dimensions();
    let short_side = width.min(height);
    if short_side == 0 {
        return Err(ParlorError::InvalidInput("Image is empty".to_string()));
    }

    let long_side = width.max(height);
    if long_side as u64 > short_side as u64 * MAX_ASPECT_RATIO as u64 {
        return Err(ParlorError::InvalidInput(format!(
            "Image aspect ratio exceeds {}:1",
            MAX_ASPECT_RATIO
        )));
    }

    let scale = TARGET_SHORT_SIDE as f64 / short_side as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8()).resize_exact(
        new_width,
        new_height,
        FilterType::Triangle,
    );
    encode_png(&rgb)
}

fn encode_png(img: &DynamicImage) -> ParlorResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ParlorError::Internal(format!("Failed to encode PNG: {}", e)))?;
    Ok(buf)
}

/// Validates uploads and forwards them to the configured service
pub struct StyleService {
    backend: Option<Arc<dyn StyleTransfer>>,
    config: StyleConfig,
}

impl StyleService {
    pub fn new(backend: Option<Arc<dyn StyleTransfer>>, config: StyleConfig) -> Self {
        Self { backend, config }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Stylize an uploaded image and return it as PNG
    pub async fn transfer(&self, style_name: &str, image: &[u8]) -> ParlorResult<Vec<u8>> {
        let style: Style = style_name.parse()?;

        if image.is_empty() {
            return Err(ParlorError::InvalidInput("No image uploaded".to_string()));
        }
        if image.len() > self.config.max_image_bytes {
            return Err(ParlorError::InvalidInput(format!(
                "Image too large. Max {} KB allowed.",
                self.config.max_image_bytes / 1024
            )));
        }

        let backend = self.backend.as_ref().ok_or_else(|| {
            ParlorError::Upstream("Style transfer service is not configured".to_string())
        })?;

        let input = preprocess(image)?;
        let result = backend.stylize(style, input).await;
        metrics::record_style_transfer(style.as_str(), result.is_ok());

        // Re-encode so callers always get PNG regardless of the service's format
        let output = image::load_from_memory(&result?).map_err(|e| {
            ParlorError::Upstream(format!("Style service returned an unreadable image: {}", e))
        })?;

        tracing::info!(
            style = %style,
            width = output.width(),
            height = output.height(),
            "style transfer complete"
        );
        encode_png(&output)
    }
}
