use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which analysis the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingType {
    #[default]
    General,
    Syllabus,
}

impl FromStr for ProcessingType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "general" | "analysis" | "educational" => Ok(ProcessingType::General),
            "syllabus" | "syllabus-extraction" | "syllabus_extraction" => {
                Ok(ProcessingType::Syllabus)
            }
            other => Err(format!("unknown processing type '{}'", other)),
        }
    }
}

const GENERAL_PROMPT: &str = "You are assisting an instructor. Analyze the attached course \
materials and respond with a single JSON object using exactly these keys:
  \"summary\": a short paragraph describing the materials,
  \"topics\": array of the main topics covered,
  \"insights\": array of notable teaching insights or gaps,
  \"learning_objectives\": array of measurable learning objectives,
  \"entities\": array of key terms, people, tools or concepts.
If you cannot produce JSON, use plain sections titled Summary:, Topics:, Insights:, \
Learning Objectives: and Entities: with one bullet per item.";

const SYLLABUS_PROMPT: &str = "Extract the syllabus details from the attached document and \
respond with a single JSON object using these keys:
  \"summary\": one paragraph describing the course,
  \"course_title\", \"instructor\", \"office_hours\": strings,
  \"learning_objectives\": array of objectives as written in the syllabus,
  \"topics\": array of weekly or unit topics in order,
  \"grading\": array of grading components with weights,
  \"schedule\": array of important dates,
  \"policies\": array of course policies,
  \"entities\": array of required textbooks, tools and resources.
Leave a key out when the syllabus does not mention it. If you cannot produce JSON, \
use plain labeled sections (e.g. Learning Objectives:, Grading:) with bullets.";

/// Builds the chat prompt for the uploaded files.
pub fn build_prompt(
    processing_type: ProcessingType,
    file_names: &[String],
    instructions: Option<&str>,
) -> String {
    let base = match processing_type {
        ProcessingType::General => GENERAL_PROMPT,
        ProcessingType::Syllabus => SYLLABUS_PROMPT,
    };

    let mut prompt = String::new();
    if let Some(extra) = instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("Instructor request: ");
        prompt.push_str(extra);
        prompt.push_str("\n\n");
    }
    prompt.push_str(base);
    if !file_names.is_empty() {
        prompt.push_str("\n\nAttached files: ");
        prompt.push_str(&file_names.join(", "));
    }
    prompt
}
