pub mod lms_models;
pub mod payloads;

pub use lms_models::{
    classify_status, course_refs, require_id, CourseRef, LmsApi, LmsError, LmsFileUpload,
    UploadStage,
};
