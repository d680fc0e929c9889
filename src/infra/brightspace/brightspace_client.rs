use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};

use super::multipart;
use super::oauth_client::OAuthTokenManager;
use crate::core::lms::payloads::{
    announcement_payload, content_module_payload, discussion_forum_payload, file_topic_payload,
    survey_payload,
};
use crate::core::lms::{
    classify_status, require_id, LmsApi, LmsError, LmsFileUpload, UploadStage,
};

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Valence REST client for one Brightspace tenant.
///
/// Holds no token of its own; every call asks the token manager for a valid
/// bearer first, so a refresh happens transparently between calls.
pub struct BrightspaceClient {
    client: Client,
    auth: Arc<OAuthTokenManager>,
    base_url: String,
    lp_version: String,
    le_version: String,
}

impl BrightspaceClient {
    pub fn new(
        auth: Arc<OAuthTokenManager>,
        base_url: impl Into<String>,
        lp_version: impl Into<String>,
        le_version: impl Into<String>,
    ) -> Result<Self, LmsError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LmsError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            auth,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            lp_version: lp_version.into(),
            le_version: le_version.into(),
        })
    }

    fn lp_url(&self, path: &str) -> String {
        format!("{}/d2l/api/lp/{}{}", self.base_url, self.lp_version, path)
    }

    fn le_url(&self, path: &str) -> String {
        format!("{}/d2l/api/le/{}{}", self.base_url, self.le_version, path)
    }

    /// Upload locations may come back host-relative.
    fn resolve(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}/{}", self.base_url, location.trim_start_matches('/'))
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, LmsError> {
        let token = self.auth.ensure_valid_token().await?;
        Ok(request.bearer_auth(token))
    }

    async fn get_json(&self, url: String, resource: &str) -> Result<Value, LmsError> {
        let request = self.authorized(self.client.get(&url)).await?;
        let response = request.send().await.map_err(transport)?;
        read_json(response, resource).await
    }

    async fn post_json(&self, url: String, payload: &Value, resource: &str) -> Result<Value, LmsError> {
        let request = self.authorized(self.client.post(&url).json(payload)).await?;
        let response = request.send().await.map_err(transport)?;
        read_json(response, resource).await
    }

    /// Step (a): ask the LMS where to send the bytes.
    async fn initiate_upload(
        &self,
        upload_path: &str,
        size: usize,
        name: &str,
        mime_type: &str,
    ) -> Result<(String, String), LmsError> {
        let fail = |detail: String| LmsError::Upload {
            stage: UploadStage::Initiate,
            detail,
        };

        let request = self
            .authorized(self.client.post(self.le_url(upload_path)).json(&json!({
                "FileName": name,
                "ContentType": mime_type,
                "Size": size,
            })))
            .await?;
        let response = request.send().await.map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        let location_header = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| fail(e.to_string()))?;
        if !status.is_success() {
            return Err(fail(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let location = location_header
            .or_else(|| first_string(&parsed, &["UploadUrl", "Location"]))
            .ok_or_else(|| fail("no upload location in response".to_string()))?;
        let file_key = first_string(&parsed, &["FileKey", "FileId", "Id"])
            .or_else(|| last_segment(&location))
            .ok_or_else(|| fail("no file identifier in response".to_string()))?;

        Ok((self.resolve(&location), file_key))
    }
}

#[async_trait]
impl LmsApi for BrightspaceClient {
    async fn get_current_user(&self) -> Result<Value, LmsError> {
        self.get_json(self.lp_url("/users/whoami"), "current user")
            .await
    }

    async fn get_courses(&self) -> Result<Value, LmsError> {
        self.get_json(self.lp_url("/enrollments/myenrollments/"), "enrollments")
            .await
    }

    async fn get_course(&self, course_id: &str) -> Result<Value, LmsError> {
        let course_id = require_id(course_id, "course id")?;
        self.get_json(
            self.lp_url(&format!("/courses/{}", course_id)),
            &format!("course {}", course_id),
        )
        .await
    }

    async fn get_course_content(&self, course_id: &str) -> Result<Value, LmsError> {
        let course_id = require_id(course_id, "course id")?;
        self.get_json(
            self.le_url(&format!("/{}/content/root/", course_id)),
            &format!("content of course {}", course_id),
        )
        .await
    }

    async fn create_announcement(&self, course_id: &str, data: Value) -> Result<Value, LmsError> {
        let course_id = require_id(course_id, "course id")?;
        let payload = announcement_payload(data, Utc::now())?;
        let json = serde_json::to_string(&payload)
            .map_err(|e| LmsError::Validation(e.to_string()))?;

        let boundary = multipart::new_boundary();
        let request = self
            .client
            .post(self.le_url(&format!("/{}/news/", course_id)))
            .header(CONTENT_TYPE, multipart::content_type(&boundary))
            .body(multipart::announcement_body(&boundary, &json));
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(transport)?;

        let created = read_json(response, "news").await?;
        tracing::info!(course_id = %course_id, "Announcement created");
        Ok(created)
    }

    async fn create_discussion_forum(
        &self,
        course_id: &str,
        data: Value,
    ) -> Result<Value, LmsError> {
        let course_id = require_id(course_id, "course id")?;
        let payload = discussion_forum_payload(data)?;
        let created = self
            .post_json(
                self.le_url(&format!("/{}/discussions/forums/", course_id)),
                &payload,
                "discussion forums",
            )
            .await?;
        tracing::info!(course_id = %course_id, "Discussion forum created");
        Ok(created)
    }

    async fn create_survey(&self, course_id: &str, data: Value) -> Result<Value, LmsError> {
        let course_id = require_id(course_id, "course id")?;
        let payload = survey_payload(data)?;
        let created = self
            .post_json(
                self.le_url(&format!("/{}/surveys/", course_id)),
                &payload,
                "surveys",
            )
            .await?;
        tracing::info!(course_id = %course_id, "Survey created");
        Ok(created)
    }

    async fn create_content_module(
        &self,
        course_id: &str,
        data: Value,
    ) -> Result<Value, LmsError> {
        let course_id = require_id(course_id, "course id")?;
        let payload = content_module_payload(data)?;
        let created = self
            .post_json(
                self.le_url(&format!("/{}/content/root/", course_id)),
                &payload,
                "course content",
            )
            .await?;
        tracing::info!(course_id = %course_id, "Content module created");
        Ok(created)
    }

    async fn create_file_topic(
        &self,
        course_id: &str,
        module_id: &str,
        data: Value,
    ) -> Result<Value, LmsError> {
        let course_id = require_id(course_id, "course id")?;
        let module_id = require_id(module_id, "module id")?;
        let payload = file_topic_payload(data)?;
        let created = self
            .post_json(
                self.le_url(&format!(
                    "/{}/content/modules/{}/structure/",
                    course_id, module_id
                )),
                &payload,
                "module structure",
            )
            .await?;
        tracing::info!(course_id = %course_id, module_id = %module_id, "File topic created");
        Ok(created)
    }

    async fn upload_file(
        &self,
        course_id: &str,
        bytes: &[u8],
        name: &str,
        mime_type: &str,
    ) -> Result<LmsFileUpload, LmsError> {
        let course_id = require_id(course_id, "course id")?;
        if name.trim().is_empty() {
            return Err(LmsError::Validation("file name is required".to_string()));
        }

        tracing::info!(course_id = %course_id, file = %name, size = bytes.len(), "Uploading file to LMS");
        let upload_path = format!("/{}/managefiles/upload/", course_id);
        let (location, file_key) = self
            .initiate_upload(&upload_path, bytes.len(), name, mime_type)
            .await?;

        // Step (b): the bytes themselves
        let transfer = |detail: String| LmsError::Upload {
            stage: UploadStage::Transfer,
            detail,
        };
        let request = self
            .authorized(
                self.client
                    .put(&location)
                    .header(CONTENT_TYPE, mime_type)
                    .timeout(UPLOAD_TIMEOUT)
                    .body(bytes.to_vec()),
            )
            .await?;
        let response = request.send().await.map_err(|e| transfer(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(transfer(format!("HTTP {}: {}", status, body)));
        }

        // Step (c): finalize under the key the LMS handed out
        let finalize = |detail: String| LmsError::Upload {
            stage: UploadStage::Finalize,
            detail,
        };
        let finalize_path = format!("{}{}/finalize", upload_path, file_key);
        let request = self
            .authorized(
                self.client
                    .post(self.le_url(&finalize_path))
                    .json(&json!({ "FileName": name })),
            )
            .await?;
        let response = request.send().await.map_err(|e| finalize(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| finalize(e.to_string()))?;
        if !status.is_success() {
            return Err(finalize(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        tracing::info!(course_id = %course_id, file = %name, file_key = %file_key, "File upload finalized");
        Ok(LmsFileUpload {
            file_key,
            file_name: name.to_string(),
            response: serde_json::from_str(&body).unwrap_or(Value::Null),
        })
    }
}

fn transport(err: reqwest::Error) -> LmsError {
    LmsError::Transport(err.to_string())
}

async fn read_json(response: Response, resource: &str) -> Result<Value, LmsError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), resource = %resource, "LMS request failed");
        return Err(classify_status(status.as_u16(), body, resource));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| LmsError::Transport(format!("invalid JSON from LMS ({}): {}", resource, e)))
}

/// First key present as a string (or number, for numeric ids).
fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn last_segment(location: &str) -> Option<String> {
    location
        .split('?')
        .next()?
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{authenticated_manager, oauth_config, spawn_stub};
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use std::sync::Mutex;

    type Calls = Arc<Mutex<Vec<String>>>;

    async fn client_for(router: Router) -> BrightspaceClient {
        let base = spawn_stub(router).await;
        BrightspaceClient::new(authenticated_manager().await, base, "1.43", "1.74").unwrap()
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(
            last_segment("/d2l/upload/abc123?x=1").as_deref(),
            Some("abc123")
        );
        assert_eq!(last_segment("https://lms/u/key9/").as_deref(), Some("key9"));
        assert_eq!(last_segment(""), None);
    }

    #[tokio::test]
    async fn test_get_sends_bearer_and_returns_json_unchanged() {
        let router = Router::new().route(
            "/d2l/api/lp/1.43/users/whoami",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "Identifier": "42", "FirstName": "Ada", "Auth": auth }))
            }),
        );
        let client = client_for(router).await;

        let user = client.get_current_user().await.unwrap();

        assert_eq!(user["FirstName"], "Ada");
        assert_eq!(user["Auth"], "Bearer test-token");
    }

    #[tokio::test]
    async fn test_course_content_reads_root_modules() {
        let router = Router::new().route(
            "/d2l/api/le/1.74/7001/content/root/",
            get(|| async { Json(json!([{ "Id": 11, "Title": "Week 1", "Type": 0 }])) }),
        );
        let client = client_for(router).await;

        let content = client.get_course_content("7001").await.unwrap();

        assert_eq!(content[0]["Title"], "Week 1");
    }

    #[tokio::test]
    async fn test_file_topic_is_posted_into_module_structure() {
        let router = Router::new().route(
            "/d2l/api/le/1.74/7001/content/modules/11/structure/",
            post(|Json(body): Json<Value>| async move {
                Json(json!({ "Id": 12, "Posted": body }))
            }),
        );
        let client = client_for(router).await;

        let created = client
            .create_file_topic(
                "7001",
                "11",
                json!({ "Title": "notes.pdf", "Url": "/content/enforced/7001/notes.pdf" }),
            )
            .await
            .unwrap();

        assert_eq!(created["Id"], 12);
        assert_eq!(created["Posted"]["Url"], "/content/enforced/7001/notes.pdf");
        assert_eq!(created["Posted"]["TopicType"], 1);
        assert!(matches!(
            client.create_file_topic("7001", "../11", json!({})).await,
            Err(LmsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_course_maps_to_not_found() {
        let client = client_for(Router::new()).await;
        assert!(matches!(
            client.get_course("7001").await,
            Err(LmsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unauthenticated_call_never_reaches_lms() {
        let hits: Calls = Arc::default();
        let seen = Arc::clone(&hits);
        let router = Router::new().route(
            "/d2l/api/lp/1.43/enrollments/myenrollments/",
            get(move || {
                seen.lock().unwrap().push("enrollments".to_string());
                async { Json(json!({ "Items": [] })) }
            }),
        );
        let base = spawn_stub(router).await;
        let auth = Arc::new(OAuthTokenManager::new(oauth_config("http://127.0.0.1:9/token")).unwrap());
        let client = BrightspaceClient::new(auth, base, "1.43", "1.74").unwrap();

        assert!(matches!(
            client.get_courses().await,
            Err(LmsError::NotAuthenticated)
        ));
        assert!(hits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_announcement_is_sent_as_multipart_mixed() {
        let captured: Arc<Mutex<Option<(String, Vec<u8>)>>> = Arc::default();
        let sink = Arc::clone(&captured);
        let router = Router::new().route(
            "/d2l/api/le/1.74/7001/news/",
            post(move |headers: HeaderMap, body: Bytes| {
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                *sink.lock().unwrap() = Some((content_type, body.to_vec()));
                async { Json(json!({ "Id": 555 })) }
            }),
        );
        let client = client_for(router).await;

        let created = client
            .create_announcement("7001", json!({ "Title": "Week 1", "Body": "Welcome" }))
            .await
            .unwrap();
        assert_eq!(created["Id"], 555);

        let (content_type, body) = captured.lock().unwrap().take().unwrap();
        let boundary = content_type
            .strip_prefix("multipart/mixed; boundary=")
            .unwrap()
            .to_string();
        let body = String::from_utf8(body).unwrap();

        let json_part = body
            .strip_prefix(&format!("--{}\r\nContent-Type: application/json\r\n\r\n", boundary))
            .and_then(|rest| rest.strip_suffix(&format!("\r\n--{}--", boundary)))
            .unwrap();
        let sent: Value = serde_json::from_str(json_part).unwrap();
        assert_eq!(sent["Title"], "Week 1");
        assert_eq!(sent["Body"], json!({ "Content": "Welcome", "Type": "Text" }));
        assert_eq!(sent["IsPublished"], true);
        assert_eq!(body, multipart::announcement_body(&boundary, json_part));
    }

    #[tokio::test]
    async fn test_forbidden_announcement_is_permission_denied() {
        let router = Router::new().route(
            "/d2l/api/le/1.74/7001/news/",
            post(|| async { (StatusCode::FORBIDDEN, "Not authorized to create news") }),
        );
        let client = client_for(router).await;

        let err = client
            .create_announcement("7001", json!({ "Title": "Week 1" }))
            .await
            .unwrap_err();

        assert!(matches!(err, LmsError::PermissionDenied { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_survey_requires_name_before_any_request() {
        let client = client_for(Router::new()).await;
        assert!(matches!(
            client.create_survey("7001", json!({ "IsActive": false })).await,
            Err(LmsError::Validation(_))
        ));
    }

    fn upload_router(calls: Calls, transfer_status: StatusCode) -> Router {
        let (c1, c2, c3) = (Arc::clone(&calls), Arc::clone(&calls), calls);
        Router::new()
            .route(
                "/d2l/api/le/1.74/7001/managefiles/upload/",
                post(move |Json(body): Json<Value>| {
                    c1.lock()
                        .unwrap()
                        .push(format!("initiate {} {}", body["FileName"], body["Size"]));
                    async {
                        (
                            StatusCode::OK,
                            [("location", "/d2l/upload/slot-9")],
                            Json(json!({ "FileKey": "fk-1" })),
                        )
                    }
                }),
            )
            .route(
                "/d2l/upload/slot-9",
                put(move |body: Bytes| {
                    c2.lock().unwrap().push(format!("put {}", body.len()));
                    async move { transfer_status }
                }),
            )
            .route(
                "/d2l/api/le/1.74/7001/managefiles/upload/fk-1/finalize",
                post(move || {
                    c3.lock().unwrap().push("finalize".to_string());
                    async { Json(json!({ "Path": "/content/notes.pdf" })) }
                }),
            )
    }

    #[tokio::test]
    async fn test_upload_runs_three_steps_with_substituted_key() {
        let calls: Calls = Arc::default();
        let client = client_for(upload_router(Arc::clone(&calls), StatusCode::OK)).await;

        let upload = client
            .upload_file("7001", b"hello pdf", "notes.pdf", "application/pdf")
            .await
            .unwrap();

        assert_eq!(upload.file_key, "fk-1");
        assert_eq!(upload.response["Path"], "/content/notes.pdf");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["initiate \"notes.pdf\" 9", "put 9", "finalize"]
        );
    }

    #[tokio::test]
    async fn test_failed_transfer_aborts_before_finalize() {
        let calls: Calls = Arc::default();
        let client = client_for(upload_router(
            Arc::clone(&calls),
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
        .await;

        let err = client
            .upload_file("7001", b"hello pdf", "notes.pdf", "application/pdf")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LmsError::Upload {
                stage: UploadStage::Transfer,
                ..
            }
        ));
        assert!(!calls.lock().unwrap().iter().any(|c| c == "finalize"));
    }
}
