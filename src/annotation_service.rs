use crate::{
    annotate::{decode_image, AnnotateError, Annotator},
    model_service::{ModelError, ModelService},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Invalid image: {0}")]
    InvalidImage(AnnotateError),
    #[error("Prediction failed: {0}")]
    Model(#[from] ModelError),
    #[error("Failed to encode annotated image: {0}")]
    Encode(AnnotateError),
}

/// Decode, detect, draw, encode. Holds no per-request state.
pub struct AnnotationService {
    model_service: Arc<dyn ModelService>,
    annotator: Annotator,
}

impl AnnotationService {
    pub fn new(model_service: Arc<dyn ModelService>, annotator: Annotator) -> Self {
        Self {
            model_service,
            annotator,
        }
    }

    #[instrument(skip_all, fields(bytes = image_data.len()))]
    pub fn annotate(&self, image_data: &[u8]) -> Result<Vec<u8>, AnnotationError> {
        let mut image = decode_image(image_data).map_err(AnnotationError::InvalidImage)?;

        let detections = self.model_service.predict(&image)?;
        for (i, detection) in detections.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class_id={}, label={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_id,
                detection.class_label,
                detection.confidence,
                detection.x1,
                detection.y1,
                detection.x2,
                detection.y2
            );
        }

        let drawn = self.annotator.annotate(&mut image, &detections);
        tracing::info!(
            width = image.width(),
            height = image.height(),
            detections = detections.len(),
            drawn,
            "Annotated image"
        );

        self.annotator
            .encode(&image)
            .map_err(AnnotationError::Encode)
    }
}
