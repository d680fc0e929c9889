// Deterministic stand-in analysis.
// Served by the offline gateway and reused as the last-resort answer when the
// live vendor never produced a usable response.

use serde_json::json;

pub const SYNTHETIC_SUMMARY: &str =
    "Placeholder analysis: the uploaded materials were received but have not been analysed by the AI service.";

/// Builds the synthetic answer text (a JSON object, the same shape the prompts ask for).
pub fn synthetic_analysis_text(file_names: &[String]) -> String {
    let files = if file_names.is_empty() {
        "the uploaded materials".to_string()
    } else {
        file_names.join(", ")
    };

    json!({
        "summary": SYNTHETIC_SUMMARY,
        "topics": [
            "Course overview",
            format!("Key concepts from {}", files),
            "Assessment and practice activities"
        ],
        "insights": [
            "Review the materials once AI analysis is available",
            "Consider pairing each topic with a short formative check"
        ],
        "learning_objectives": [
            "Identify the core concepts introduced in the materials",
            "Apply the concepts in a guided exercise"
        ],
        "entities": file_names
    })
    .to_string()
}
