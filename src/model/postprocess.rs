//! Letterbox preprocessing and YOLO output decoding

use std::collections::BTreeMap;

use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::Array4;

use super::detector::{Detection, InferenceError};

/// Gray used by Ultralytics for letterbox padding
const PAD_VALUE: u8 = 114;

/// Box coordinates before the class scores in each output column
const BOX_CHANNELS: usize = 4;

/// Geometry needed to map model-space boxes back onto the source image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    pub fn for_image(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round() as u32;
        let new_h = (height as f32 * scale).round() as u32;

        Self {
            scale,
            pad_x: (target - new_w.min(target)) as f32 / 2.0,
            pad_y: (target - new_h.min(target)) as f32 / 2.0,
            orig_width: width,
            orig_height: height,
        }
    }

    /// Map an xyxy box from model input space to source pixels
    pub fn unscale(&self, bbox: [f32; 4]) -> [f32; 4] {
        let w = self.orig_width as f32;
        let h = self.orig_height as f32;
        [
            ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w),
            ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h),
            ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w),
            ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h),
        ]
    }
}

/// Resize with preserved aspect ratio, pad to a square and build an NCHW tensor in [0, 1]
pub fn letterbox(image: &RgbImage, target: u32) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let lb = Letterbox::for_image(width.max(1), height.max(1), target);

    let new_w = ((width as f32 * lb.scale).round() as u32).clamp(1, target);
    let new_h = ((height as f32 * lb.scale).round() as u32).clamp(1, target);
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(target, target, Rgb([PAD_VALUE; 3]));
    // Ultralytics rounds the leading pad down by 0.1 px before casting
    let left = (lb.pad_x - 0.1).round().max(0.0) as i64;
    let top = (lb.pad_y - 0.1).round().max(0.0) as i64;
    image::imageops::overlay(&mut canvas, &resized, left, top);

    let size = target as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    let lb = Letterbox {
        pad_x: left as f32,
        pad_y: top as f32,
        ..lb
    };

    (tensor, lb)
}

/// Layout of a `[1, 4 + nc, anchors]` (or transposed) detection head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadLayout {
    pub channels: usize,
    pub anchors: usize,
    pub transposed: bool,
}

impl HeadLayout {
    /// Work out the layout from an output shape, expecting `4 + class_count` channels
    pub fn from_shape(shape: &[usize], class_count: usize) -> Result<Self, InferenceError> {
        let expected = BOX_CHANNELS + class_count;
        match shape {
            [1, a, b] if *a == expected => Ok(Self { channels: *a, anchors: *b, transposed: false }),
            [1, a, b] if *b == expected => Ok(Self { channels: *b, anchors: *a, transposed: true }),
            _ => Err(InferenceError::Shape(format!(
                "expected output [1, {}, N], got {:?}",
                expected, shape
            ))),
        }
    }

    /// Output shape this layout was derived from
    pub fn shape(&self) -> [usize; 3] {
        if self.transposed {
            [1, self.anchors, self.channels]
        } else {
            [1, self.channels, self.anchors]
        }
    }

    fn at(&self, data: &[f32], channel: usize, anchor: usize) -> f32 {
        if self.transposed {
            data[anchor * self.channels + channel]
        } else {
            data[channel * self.anchors + anchor]
        }
    }
}

/// Decode raw head output into detections sorted by confidence, after per-class NMS
pub fn decode(
    data: &[f32],
    layout: HeadLayout,
    letterbox: &Letterbox,
    conf_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
) -> Result<Vec<Detection>, InferenceError> {
    if data.len() < layout.channels * layout.anchors {
        return Err(InferenceError::Shape(format!(
            "output holds {} values, layout needs {}",
            data.len(),
            layout.channels * layout.anchors
        )));
    }

    let mut candidates = Vec::new();
    for anchor in 0..layout.anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class_id in 0..layout.channels - BOX_CHANNELS {
            let score = layout.at(data, BOX_CHANNELS + class_id, anchor);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }

        if best_score <= conf_threshold {
            continue;
        }

        let cx = layout.at(data, 0, anchor);
        let cy = layout.at(data, 1, anchor);
        let w = layout.at(data, 2, anchor);
        let h = layout.at(data, 3, anchor);
        let bbox = [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0];

        candidates.push(Detection {
            class_id: best_class,
            confidence: best_score.clamp(0.0, 1.0),
            bbox,
        });
    }

    let mut kept = non_max_suppression(candidates, iou_threshold, max_detections);
    for det in &mut kept {
        det.bbox = letterbox.unscale(det.bbox);
    }
    Ok(kept)
}

/// Greedy per-class NMS; output is in descending confidence order
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Parse the Ultralytics `names` metadata, e.g. `{0: 'High', 1: 'Low'}`
pub fn parse_class_names(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;

    let mut entries = BTreeMap::new();
    for entry in split_entries(body) {
        let (key, value) = entry.split_once(':')?;
        let id: usize = key.trim().parse().ok()?;
        let name = value.trim().trim_matches(|c| c == '\'' || c == '"');
        entries.insert(id, name.to_string());
    }

    // Ids must be dense, starting at zero
    if entries.is_empty() || entries.keys().enumerate().any(|(i, id)| i != *id) {
        return None;
    }
    Some(entries.into_values().collect())
}

/// Split on commas that are not inside quotes
fn split_entries(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in body.char_indices() {
        match (ch, quote) {
            ('\'' | '"', None) => quote = Some(ch),
            (c, Some(q)) if c == q => quote = None,
            (',', None) => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}
