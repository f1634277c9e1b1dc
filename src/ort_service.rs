use crate::{
    config::{ModelConfig, Validatable},
    detection::Detection,
    labels::ClassLabels,
    model_service::{ModelError, ModelService},
};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, ArrayView2, Axis, Ix2, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

fn transform_image(image: &RgbImage, input_size: u32) -> Array<f32, Ix4> {
    let size = input_size as usize;
    let resized = image::imageops::resize(image, input_size, input_size, FilterType::CatmullRom);

    let mut input = Array::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

#[derive(Debug, Clone, Copy)]
struct PostProcessing {
    input_size: f32,
    min_probability: f32,
    iou_threshold: f32,
}

/// Decodes a YOLOv8 head laid out as `[4 + classes, anchors]`, where the first
/// four rows are centre x, centre y, width and height in model input pixels.
fn extract_detections(
    output: ArrayView2<f32>,
    img_width: u32,
    img_height: u32,
    params: PostProcessing,
    labels: &ClassLabels,
) -> Result<Vec<Detection>, ModelError> {
    if output.nrows() <= 4 {
        return Err(ModelError::InvalidOutput(format!(
            "expected at least 5 rows per anchor, got {}",
            output.nrows()
        )));
    }

    let (width, height) = (img_width as f32, img_height as f32);
    let scale_x = width / params.input_size;
    let scale_y = height / params.input_size;
    let mut boxes = Vec::new();

    for anchor in output.axis_iter(Axis(1)) {
        let best = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, row| if row.1 > accum.1 { row } else { accum });
        let Some((class_id, prob)) = best else {
            continue;
        };

        if prob < params.min_probability {
            continue;
        }

        let xc = anchor[0] * scale_x;
        let yc = anchor[1] * scale_y;
        let w = anchor[2] * scale_x;
        let h = anchor[3] * scale_y;

        boxes.push(Detection {
            x1: (xc - w / 2.).clamp(0., width),
            y1: (yc - h / 2.).clamp(0., height),
            x2: (xc + w / 2.).clamp(0., width),
            y2: (yc + h / 2.).clamp(0., height),
            class_id,
            class_label: labels.name(class_id),
            confidence: prob,
        });
    }

    Ok(non_max_suppression(boxes, params.iou_threshold))
}

/// Greedy per-class NMS. Boxes of different classes never suppress each other.
fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    let mut result: Vec<Detection> = Vec::new();
    for candidate in boxes {
        let suppressed = result
            .iter()
            .any(|kept| kept.class_id == candidate.class_id && kept.iou(&candidate) >= iou_threshold);
        if !suppressed {
            result.push(candidate);
        }
    }

    result
}

/// ONNX Runtime YOLO detector. The model is loaded once into a pool of
/// sessions which are handed out round-robin.
pub struct OrtModelService {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    labels: ClassLabels,
    input_size: u32,
    min_probability: f32,
    iou_threshold: f32,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig, labels: ClassLabels) -> Result<Self, ModelError> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?} with {} class labels",
            num_instances,
            model_config.get_path(),
            labels.len()
        );

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
            labels,
            input_size: model_config.input_size,
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ndarray::ArrayD<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InvalidOutput(format!("failed to extract tensor: {}", e)))?;

        let array = ndarray::ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| ModelError::InvalidOutput(format!("invalid tensor shape: {}", e)))?;

        Ok(array)
    }
}

impl ModelService for OrtModelService {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError> {
        let input = transform_image(image, self.input_size);
        let outputs = self.run_inference(&input)?;

        if outputs.ndim() != 3 || outputs.shape()[0] == 0 {
            return Err(ModelError::InvalidOutput(format!(
                "expected a [1, 4 + classes, anchors] tensor, got {:?}",
                outputs.shape()
            )));
        }

        let output = outputs
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| ModelError::InvalidOutput(e.to_string()))?;

        let params = PostProcessing {
            input_size: self.input_size as f32,
            min_probability: self.min_probability,
            iou_threshold: self.iou_threshold,
        };

        extract_detections(output, image.width(), image.height(), params, &self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::Array2;

    const PARAMS: PostProcessing = PostProcessing {
        input_size: 640.,
        min_probability: 0.25,
        iou_threshold: 0.7,
    };

    fn labels() -> ClassLabels {
        ClassLabels::new(vec!["caries".to_string(), "filling".to_string()])
    }

    fn detection(class_id: usize, confidence: f32, x1: f32) -> Detection {
        Detection {
            x1,
            y1: 0.,
            x2: x1 + 100.,
            y2: 100.,
            class_id,
            class_label: String::new(),
            confidence,
        }
    }

    #[test]
    fn test_transform_image() {
        let img = RgbImage::from_pixel(100, 50, Rgb([255, 0, 0]));

        let input = transform_image(&img, 640);

        assert_eq!(input.shape(), &[1, 3, 640, 640]);
        assert!((input[[0, 0, 320, 320]] - 1.0).abs() < 1e-3);
        assert!(input[[0, 1, 320, 320]].abs() < 1e-3);
        assert!(input[[0, 2, 320, 320]].abs() < 1e-3);
    }

    #[test]
    fn test_extract_detections_scales_to_original_image() {
        #[rustfmt::skip]
        let output = Array2::from_shape_vec(
            (6, 3),
            vec![
                100., 0., 300., // xc
                100., 0., 300., // yc
                50., 0., 20.,   // w
                40., 0., 20.,   // h
                0.9, 0.1, 0.3,  // caries
                0.1, 0.2, 0.6,  // filling
            ],
        )
        .unwrap();

        let detections = extract_detections(output.view(), 1280, 640, PARAMS, &labels()).unwrap();

        assert_eq!(detections.len(), 2);

        assert_eq!(detections[0].class_id, 0);
        assert_eq!(detections[0].class_label, "caries");
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(
            (detections[0].x1, detections[0].y1, detections[0].x2, detections[0].y2),
            (150., 80., 250., 120.)
        );

        assert_eq!(detections[1].class_id, 1);
        assert_eq!(detections[1].class_label, "filling");
        assert_eq!(
            (detections[1].x1, detections[1].y1, detections[1].x2, detections[1].y2),
            (580., 290., 620., 310.)
        );
    }

    #[test]
    fn test_extract_detections_clips_to_image_bounds() {
        #[rustfmt::skip]
        let output = Array2::from_shape_vec(
            (6, 2),
            vec![
                4., 630., // xc
                320., 636., // yc
                20., 40.,   // w
                100., 30.,  // h
                0.8, 0.1,   // caries
                0.1, 0.7,   // filling
            ],
        )
        .unwrap();

        let detections = extract_detections(output.view(), 320, 320, PARAMS, &labels()).unwrap();

        assert_eq!(detections.len(), 2);
        // 4 ± 10 input px at half scale: -3 .. 7
        assert_eq!(
            (detections[0].x1, detections[0].y1, detections[0].x2, detections[0].y2),
            (0., 135., 7., 185.)
        );
        // 630 ± 20 and 636 ± 15: right and bottom edges fall past 320
        assert_eq!(
            (detections[1].x1, detections[1].y1, detections[1].x2, detections[1].y2),
            (305., 310.5, 320., 320.)
        );
    }

    #[test]
    fn test_extract_detections_rejects_headless_output() {
        let output = Array2::<f32>::zeros((4, 10));
        let result = extract_detections(output.view(), 640, 640, PARAMS, &labels());
        assert!(matches!(result, Err(ModelError::InvalidOutput(_))));
    }

    #[test]
    fn test_nms_suppresses_overlapping_boxes_of_same_class() {
        let boxes = vec![
            detection(0, 0.6, 5.),
            detection(0, 0.9, 0.),
            detection(0, 0.4, 500.),
        ];

        let kept = non_max_suppression(boxes, 0.7);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.4);
    }

    #[test]
    fn test_nms_keeps_overlapping_boxes_of_different_classes() {
        let boxes = vec![detection(0, 0.9, 0.), detection(1, 0.8, 0.)];

        let kept = non_max_suppression(boxes, 0.7);

        assert_eq!(kept.len(), 2);
    }
}
