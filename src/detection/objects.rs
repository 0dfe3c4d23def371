//! Detected objects and the object-mention lookup.

use serde::{Deserialize, Serialize};

/// The 80 COCO class labels, indexed by class id.
const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Label for a COCO class id.
pub fn coco_label(class_id: u32) -> Option<&'static str> {
    COCO_CLASSES.get(class_id as usize).copied()
}

/// One object reported by the image endpoint, in normalized coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    /// Horizontal position, 0.0 (left) to 1.0 (right).
    pub x: f32,
    /// Vertical position, 0.0 (top) to 1.0 (bottom).
    pub y: f32,
    pub confidence: Option<f32>,
}

/// Names of detected objects mentioned in `reply` (case-insensitive substring).
///
/// Each label is reported once, in detection order. Purely advisory: the
/// result is published for the visualization layer and feeds nothing else.
pub fn mentioned_objects(reply: &str, objects: &[DetectedObject]) -> Vec<String> {
    let reply = reply.to_lowercase();
    let mut mentioned: Vec<String> = Vec::new();
    for object in objects {
        let label = object.label.to_lowercase();
        if !label.is_empty() && reply.contains(&label) && !mentioned.contains(&object.label) {
            mentioned.push(object.label.clone());
        }
    }
    mentioned
}
