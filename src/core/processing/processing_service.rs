// This is the orchestration module - it glues the LMS gateway and the AI
// gateway into the two user-facing operations: analyse uploaded files, and
// publish an analysis back into a course.
//
// Like the rest of `core/`, it only sees the `LmsApi` / `AiGateway` traits, so
// it runs the same against the live HTTP clients, the offline gateway, or the
// hand-written mocks in the tests below.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;

use super::prompts::{build_prompt, ProcessingType};
use super::response_parser::{parse_analysis, DerivedFields};
use super::retry::{is_not_ready, RetryPolicy};
use crate::core::ai::synthetic::synthetic_analysis_text;
use crate::core::ai::{AiConfig, AiGateway, ChatRequest, UploadOptions, UploadedFile};
use crate::core::lms::{LmsApi, LmsError};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("{0}")]
    Validation(String),
    /// Every upload failed, so there is nothing to analyse.
    #[error("none of the files could be uploaded: {}", .failures.join("; "))]
    NoFilesUploaded { failures: Vec<String> },
    /// The retry heuristic gave up. Never reaches the caller; it triggers the fallback answer.
    #[error("analysis still incomplete after {attempts} attempts")]
    ProcessingIncomplete { attempts: u32 },
}

// ============================================================================
// DOMAIN MODELS
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ProcessingOptions {
    pub processing_type: ProcessingType,
    /// Free-form instructor request prepended to the prompt.
    pub instructions: Option<String>,
    pub upload: UploadOptions,
}

/// Where a single file is in its journey.
///
/// `Selected -> Uploading -> Uploaded -> Analyzing -> {Analyzed | AnalysisFallback} -> Published`,
/// or `UploadFailed` if the vendor refused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileStage {
    Selected,
    Uploading,
    Uploaded,
    UploadFailed,
    Analyzing,
    Analyzed,
    AnalysisFallback,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub name: String,
    #[serde(default)]
    pub size: usize,
    pub stage: FileStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn selected(file: &UploadedFile) -> Self {
        Self {
            name: file.name.clone(),
            size: file.size(),
            stage: FileStage::Selected,
            key: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStatus {
    Analyzed,
    /// Uploads worked but no usable answer came back; fields are placeholders.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    #[serde(default)]
    pub processing_type: ProcessingType,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub fields: DerivedFields,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOutcome {
    pub files: Vec<FileReport>,
    pub analysis: AnalysisResult,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub course_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub analysis: AnalysisResult,
    #[serde(default = "default_true")]
    pub create_module: bool,
    #[serde(default = "default_true")]
    pub create_announcement: bool,
    #[serde(default)]
    pub create_discussion: bool,
    /// File reports echoed back from processing, advanced to `Published` on success.
    #[serde(default)]
    pub files: Vec<FileReport>,
    /// Course files to link from the new module.
    #[serde(default)]
    pub attachments: Vec<PublishAttachment>,
}

/// A file already uploaded to the course, as returned by the LMS upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishAttachment {
    pub name: String,
    /// Course file path (`Path` in the upload response).
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubOperationResult {
    pub operation: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl SubOperationResult {
    fn from_result(operation: &str, result: Result<Value, LmsError>) -> Self {
        match result {
            Ok(response) => Self {
                operation: operation.to_string(),
                success: true,
                id: response.get("Id").cloned(),
                error: None,
                error_kind: None,
            },
            Err(err) => {
                tracing::warn!(operation, error = %err, "Publish sub-operation failed");
                Self {
                    operation: operation.to_string(),
                    success: false,
                    id: None,
                    error_kind: Some(error_kind(&err).to_string()),
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

fn error_kind(err: &LmsError) -> &'static str {
    match err {
        LmsError::NotAuthenticated | LmsError::Auth(_) => "notAuthenticated",
        LmsError::PermissionDenied { .. } => "permissionDenied",
        LmsError::NotFound(_) => "notFound",
        LmsError::Validation(_) => "validation",
        LmsError::Upload { .. } => "upload",
        LmsError::Upstream { .. } | LmsError::Transport(_) => "upstream",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub course_id: String,
    /// True only if every attempted sub-operation succeeded.
    pub success: bool,
    pub operations: Vec<SubOperationResult>,
    pub files: Vec<FileReport>,
}

const DEFAULT_PUBLISH_TITLE: &str = "Course Material Analysis";

const FALLBACK_MESSAGE: &str = "Files were uploaded, but the AI analysis is not available yet. \
The fields below are placeholders; try again in a few minutes.";

// ============================================================================
// SERVICE
// ============================================================================

pub struct ProcessingService<L: LmsApi, A: AiGateway> {
    lms: L,
    ai: A,
    ai_config: AiConfig,
    policy: RetryPolicy,
}

impl<L, A> ProcessingService<L, A>
where
    L: LmsApi,
    A: AiGateway,
{
    pub fn new(lms: L, ai: A, ai_config: AiConfig, policy: RetryPolicy) -> Self {
        Self {
            lms,
            ai,
            ai_config,
            policy,
        }
    }

    /// Uploads the files one by one, then asks for an analysis over the ones that made it.
    ///
    /// Individual upload failures are recorded and skipped. Only "no files" and
    /// "every upload failed" are errors; an analysis that never becomes ready
    /// still returns a (fallback) result.
    pub async fn process_files(
        &self,
        files: Vec<UploadedFile>,
        options: &ProcessingOptions,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        if files.is_empty() {
            return Err(ProcessingError::Validation(
                "at least one file is required".to_string(),
            ));
        }

        let mut reports: Vec<FileReport> = files.iter().map(FileReport::selected).collect();
        let mut keys = Vec::new();
        let mut uploaded_names = Vec::new();
        let mut failures = Vec::new();

        for (index, (file, report)) in files.iter().zip(reports.iter_mut()).enumerate() {
            if index > 0 {
                sleep(self.policy.pacing_delay).await;
            }

            report.stage = FileStage::Uploading;
            tracing::info!(file = %file.name, size = file.size(), "Uploading file for analysis");

            match self.ai.upload_file(file, &options.upload).await {
                Ok(upload) => {
                    report.stage = FileStage::Uploaded;
                    report.key = Some(upload.key.clone());
                    keys.push(upload.key);
                    uploaded_names.push(file.name.clone());
                }
                Err(err) => {
                    tracing::warn!(file = %file.name, error = %err, "Upload failed, skipping file");
                    report.stage = FileStage::UploadFailed;
                    report.error = Some(err.to_string());
                    failures.push(format!("{}: {}", file.name, err));
                }
            }
        }

        if keys.is_empty() {
            return Err(ProcessingError::NoFilesUploaded { failures });
        }

        set_stage(&mut reports, FileStage::Uploaded, FileStage::Analyzing);

        let prompt = build_prompt(
            options.processing_type,
            &uploaded_names,
            options.instructions.as_deref(),
        );

        let analysis = match self.analyze_with_retry(prompt, keys).await {
            Ok((content, attempts)) => {
                set_stage(&mut reports, FileStage::Analyzing, FileStage::Analyzed);
                AnalysisResult {
                    status: AnalysisStatus::Analyzed,
                    processing_type: options.processing_type,
                    fields: parse_analysis(&content),
                    raw_text: content,
                    attempts,
                    message: None,
                }
            }
            Err(err) => {
                let attempts = match err {
                    ProcessingError::ProcessingIncomplete { attempts } => attempts,
                    _ => 0,
                };
                tracing::warn!(attempts, "Analysis unavailable, returning fallback result");
                set_stage(&mut reports, FileStage::Analyzing, FileStage::AnalysisFallback);
                let raw_text = synthetic_analysis_text(&uploaded_names);
                AnalysisResult {
                    status: AnalysisStatus::Fallback,
                    processing_type: options.processing_type,
                    fields: parse_analysis(&raw_text),
                    raw_text,
                    attempts,
                    message: Some(FALLBACK_MESSAGE.to_string()),
                }
            }
        };

        Ok(ProcessingOutcome {
            files: reports,
            analysis,
        })
    }

    /// Settle, ask, and re-ask with linear backoff while the answer looks like a placeholder.
    ///
    /// Returns the accepted content and how many chat calls it took.
    async fn analyze_with_retry(
        &self,
        prompt: String,
        data_sources: Vec<String>,
    ) -> Result<(String, u32), ProcessingError> {
        sleep(self.policy.settle_delay).await;

        let request = ChatRequest::new(prompt, data_sources, &self.ai_config);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.ai.chat(&request).await {
                Ok(response) if response.success && !is_not_ready(&response.content) => {
                    tracing::info!(attempts, "Analysis completed");
                    return Ok((response.content, attempts));
                }
                Ok(_) => {
                    tracing::warn!(attempt = attempts, "Analysis not ready yet");
                }
                Err(err) => {
                    tracing::warn!(attempt = attempts, error = %err, "Analysis call failed");
                }
            }

            if attempts > self.policy.max_retries {
                return Err(ProcessingError::ProcessingIncomplete { attempts });
            }
            sleep(self.policy.backoff(attempts)).await;
        }
    }

    /// Posts an analysis into a course as a module, an announcement and
    /// optionally a discussion forum.
    ///
    /// Sub-operations are independent: a failure is reported next to the
    /// successes, nothing already created is rolled back.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishResult, ProcessingError> {
        let course_id = request.course_id.trim().to_string();
        if course_id.is_empty() {
            return Err(ProcessingError::Validation(
                "courseId is required".to_string(),
            ));
        }

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_PUBLISH_TITLE)
            .to_string();
        let fields = &request.analysis.fields;
        let mut operations = Vec::new();

        let mut module_id = None;
        if request.create_module {
            let payload = json!({
                "Title": title,
                "Description": { "Content": render_module_html(fields), "Type": "Html" }
            });
            let result = self.lms.create_content_module(&course_id, payload).await;
            let operation = SubOperationResult::from_result("createModule", result);
            module_id = operation.id.as_ref().and_then(id_text);
            operations.push(operation);
        }

        for attachment in &request.attachments {
            let result = match &module_id {
                Some(module_id) => {
                    let payload = json!({ "Title": attachment.name, "Url": attachment.path });
                    self.lms
                        .create_file_topic(&course_id, module_id, payload)
                        .await
                }
                None => Err(LmsError::Validation(
                    "no module was created to attach the file to".to_string(),
                )),
            };
            let operation = format!("attachFile:{}", attachment.name);
            operations.push(SubOperationResult::from_result(&operation, result));
        }

        if request.create_announcement {
            let payload = json!({
                "Title": title,
                "Body": { "Content": render_announcement_html(&request.analysis), "Type": "Html" }
            });
            let result = self.lms.create_announcement(&course_id, payload).await;
            operations.push(SubOperationResult::from_result("createAnnouncement", result));
        }

        if request.create_discussion {
            let payload = json!({
                "Name": format!("Discuss: {}", title),
                "Description": { "Content": render_discussion_html(fields), "Type": "Html" }
            });
            let result = self.lms.create_discussion_forum(&course_id, payload).await;
            operations.push(SubOperationResult::from_result("createDiscussion", result));
        }

        let success = !operations.is_empty() && operations.iter().all(|op| op.success);
        let mut files = request.files;
        if operations.iter().any(|op| op.success) {
            set_stage(&mut files, FileStage::Analyzed, FileStage::Published);
            set_stage(&mut files, FileStage::AnalysisFallback, FileStage::Published);
        }

        tracing::info!(
            course_id = %course_id,
            attempted = operations.len(),
            succeeded = operations.iter().filter(|op| op.success).count(),
            "Publish finished"
        );

        Ok(PublishResult {
            course_id,
            success,
            operations,
            files,
        })
    }
}

fn id_text(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn set_stage(reports: &mut [FileReport], from: FileStage, to: FileStage) {
    for report in reports.iter_mut().filter(|r| r.stage == from) {
        report.stage = to;
    }
}

// ============================================================================
// HTML RENDERING
// ============================================================================

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn push_list(html: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    html.push_str(&format!("<h3>{}</h3><ul>", escape_html(heading)));
    for item in items {
        html.push_str(&format!("<li>{}</li>", escape_html(item)));
    }
    html.push_str("</ul>");
}

fn push_summary(html: &mut String, fields: &DerivedFields) {
    if let Some(summary) = &fields.summary {
        html.push_str(&format!("<p>{}</p>", escape_html(summary)));
    }
}

fn render_module_html(fields: &DerivedFields) -> String {
    let mut html = String::new();
    push_summary(&mut html, fields);
    push_list(&mut html, "Learning Objectives", &fields.learning_objectives);
    push_list(&mut html, "Topics", &fields.topics);
    push_list(&mut html, "Key Terms", &fields.entities);
    for (label, items) in &fields.sections {
        push_list(&mut html, label, items);
    }
    html
}

fn render_announcement_html(analysis: &AnalysisResult) -> String {
    let mut html = String::new();
    push_summary(&mut html, &analysis.fields);
    push_list(&mut html, "Highlights", &analysis.fields.insights);
    if analysis.status == AnalysisStatus::Fallback {
        html.push_str("<p><em>Detailed analysis will follow.</em></p>");
    }
    html
}

fn render_discussion_html(fields: &DerivedFields) -> String {
    let mut html = String::from("<p>Use this forum to discuss the following topics.</p>");
    push_list(&mut html, "Topics", &fields.topics);
    html
}

// ============================================================================
// TESTS
// ============================================================================
