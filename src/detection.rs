/// One object found by the model, in original image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
    pub class_label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.) * (self.y2 - self.y1).max(0.)
    }

    pub fn intersection(&self, other: &Detection) -> f32 {
        let w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let h = self.y2.min(other.y2) - self.y1.max(other.y1);
        w.max(0.) * h.max(0.)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;
        if union <= 0. {
            return 0.;
        }
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            class_id: 0,
            class_label: "caries".to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_iou_identical_boxes() {
        let a = bbox(0., 0., 10., 10.);
        assert_eq!(a.iou(&a.clone()), 1.0);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = bbox(0., 0., 10., 10.);
        let b = bbox(20., 20., 30., 30.);
        assert_eq!(a.intersection(&b), 0.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = bbox(0., 0., 10., 10.);
        let b = bbox(5., 0., 15., 10.);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1. / 3.).abs() < 1e-6);
    }
}
