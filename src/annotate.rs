use crate::{config::AnnotationConfig, detection::Detection};
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use std::{io::Cursor, path::Path};
use thiserror::Error;

/// Minimum confidence, in percent, for a detection to be drawn.
pub const CONFIDENCE_THRESHOLD: f64 = 50.0;

/// Outline and label colors, picked by `class_id % COLOR_TABLE.len()`.
pub const COLOR_TABLE: [Rgb<u8>; 4] = [
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 0, 255]),
];

const LABEL_OFFSET: i32 = 10;

static DEFAULT_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Empty image data")]
    EmptyImage,
    #[error("Failed to read image: {0}")]
    Read(std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),
    #[error("Failed to load font {0:?}: {1}")]
    Font(String, String),
}

pub fn color_for_class(class_id: usize) -> Rgb<u8> {
    COLOR_TABLE[class_id % COLOR_TABLE.len()]
}

/// `confidence × 100` rounded to two decimals.
pub fn confidence_percentage(confidence: f32) -> f64 {
    (confidence as f64 * 100.0 * 100.0).round() / 100.0
}

/// Formats a percentage the way a rounded float prints: shortest form, but
/// always with a fractional digit (`50.0`, `87.5`, `49.99`).
pub fn format_percentage(percentage: f64) -> String {
    if percentage.fract() == 0.0 {
        format!("{:.1}", percentage)
    } else {
        format!("{}", percentage)
    }
}

pub fn format_label(name: &str, percentage: f64) -> String {
    format!("{}: {}%", name, format_percentage(percentage))
}

/// Decodes any supported image format into a 3-channel RGB buffer.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, AnnotateError> {
    if bytes.is_empty() {
        return Err(AnnotateError::EmptyImage);
    }

    let image = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(AnnotateError::Read)?
        .decode()
        .map_err(AnnotateError::Decode)?;

    Ok(image.to_rgb8())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, AnnotateError> {
    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode_image(image).map_err(AnnotateError::Encode)?;
    }
    Ok(buf)
}

/// The DejaVu Sans face bundled into the binary.
pub fn default_font() -> Result<FontArc, AnnotateError> {
    FontArc::try_from_slice(DEFAULT_FONT)
        .map_err(|e| AnnotateError::Font("<embedded>".to_string(), e.to_string()))
}

pub fn load_font(path: &Path) -> Result<FontArc, AnnotateError> {
    let data = std::fs::read(path)
        .map_err(|e| AnnotateError::Font(path.display().to_string(), e.to_string()))?;
    FontArc::try_from_vec(data)
        .map_err(|e| AnnotateError::Font(path.display().to_string(), e.to_string()))
}

/// Draws detections onto images. Immutable once built, shared by all requests.
#[derive(Clone)]
pub struct Annotator {
    font: FontArc,
    font_scale: PxScale,
    jpeg_quality: u8,
}

impl Annotator {
    pub fn new(font: FontArc, font_scale: f32, jpeg_quality: u8) -> Self {
        Self {
            font,
            font_scale: PxScale::from(font_scale),
            jpeg_quality,
        }
    }

    /// Uses `annotation.font_file` when set, the bundled font otherwise.
    pub fn from_config(annotation_cfg: &AnnotationConfig) -> Result<Self, AnnotateError> {
        let font = match &annotation_cfg.font_file {
            Some(path) => {
                let font = load_font(path)?;
                tracing::info!("Loaded label font from {:?}", path);
                font
            }
            None => default_font()?,
        };

        Ok(Self::new(
            font,
            annotation_cfg.font_scale,
            annotation_cfg.jpeg_quality,
        ))
    }

    pub fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, AnnotateError> {
        encode_jpeg(image, self.jpeg_quality)
    }

    /// Draws every detection at or above [`CONFIDENCE_THRESHOLD`] and returns
    /// how many were drawn.
    pub fn annotate(&self, image: &mut RgbImage, detections: &[Detection]) -> usize {
        let mut drawn = 0;

        for detection in detections {
            let percentage = confidence_percentage(detection.confidence);
            if percentage < CONFIDENCE_THRESHOLD {
                continue;
            }

            let color = color_for_class(detection.class_id);
            let label = format_label(&detection.class_label, percentage);

            let (width, height) = (image.width() as i32, image.height() as i32);
            let x1 = clamp_coordinate(detection.x1, width);
            let y1 = clamp_coordinate(detection.y1, height);
            let x2 = clamp_coordinate(detection.x2, width);
            let y2 = clamp_coordinate(detection.y2, height);

            if x2 < x1 || y2 < y1 {
                continue;
            }

            draw_outline(image, x1, y1, x2, y2, color);
            self.draw_label(image, x1, y1 - LABEL_OFFSET, &label, color);
            drawn += 1;
        }

        drawn
    }

    fn draw_label(&self, image: &mut RgbImage, x: i32, baseline: i32, label: &str, color: Rgb<u8>) {
        let font = &self.font;

        // draw_text_mut positions the top of the line, not the baseline
        let ascent = font.as_scaled(self.font_scale).ascent().round() as i32;
        let top = baseline - ascent;

        for dx in 0..2 {
            draw_text_mut(image, color, x + dx, top, self.font_scale, font, label);
        }
    }
}

// Keeps off-image corners off-image (including the inner outline) while
// bounding the line lengths. Halves go to the even pixel.
fn clamp_coordinate(value: f32, size: i32) -> i32 {
    (value.round_ties_even() as i32).clamp(-2, size + 1)
}

// Two-pixel outline: the rectangle through the corners plus one inset by a pixel.
fn draw_outline(image: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb<u8>) {
    let width = (x2 - x1 + 1) as u32;
    let height = (y2 - y1 + 1) as u32;
    draw_hollow_rect_mut(image, Rect::at(x1, y1).of_size(width, height), color);

    if width > 2 && height > 2 {
        draw_hollow_rect_mut(
            image,
            Rect::at(x1 + 1, y1 + 1).of_size(width - 2, height - 2),
            color,
        );
    }
}
