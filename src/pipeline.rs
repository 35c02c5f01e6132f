//! Prediction pipeline: image in, severity verdict out

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::advice::{self, NO_DETECTION_LABEL};
use crate::model::{Detector, InferenceError};

/// Response body of both prediction endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub success: bool,
    pub prediction: String,
    pub class_name: String,
    pub causes: String,
    pub remedies: String,
    /// `None` when nothing was detected
    pub confidence: Option<f32>,
}

/// Run the detector and build the verdict from its first detection
pub fn predict(
    detector: &dyn Detector,
    image: &DynamicImage,
    conf_threshold: f32,
) -> Result<PredictionResult, InferenceError> {
    let rgb = image.to_rgb8();
    let detections = detector.detect(&rgb, conf_threshold)?;

    // The detector's order is authoritative, no re-sorting here
    let (class_name, confidence) = match detections.first() {
        Some(top) => {
            let name = detector
                .class_name(top.class_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class_{}", top.class_id));
            (name, Some(top.confidence.clamp(0.0, 1.0)))
        }
        None => (NO_DETECTION_LABEL.to_string(), None),
    };

    tracing::debug!(
        "Prediction: {} ({:?}) from {} detections",
        class_name, confidence, detections.len()
    );

    let advice = advice::lookup(&class_name);

    Ok(PredictionResult {
        success: true,
        prediction: display_label(&class_name),
        class_name,
        causes: advice.causes.to_string(),
        remedies: advice.remedies.to_string(),
        confidence,
    })
}

/// `moderate_dark` -> `Moderate dark`: underscores to spaces, first
/// character upper case, the rest lower case
pub fn display_label(class_name: &str) -> String {
    let spaced = class_name.replace('_', " ");
    let mut chars = spaced.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest = chars.as_str().to_lowercase();
    first.to_uppercase().chain(rest.chars()).collect()
}
