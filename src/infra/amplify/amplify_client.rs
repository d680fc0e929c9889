use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::ai::{
    AiError, AiGateway, AiMessage, AiMode, ChatRequest, ChatResponse, UploadOptions, UploadResult,
    UploadedFile,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Live client for the Amplify API.
pub struct AmplifyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AmplifyClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn post_api(&self, path: &str, payload: &Value) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
    }
}

/// Descriptor for `/files/upload`. Every payload to this API sits under `data`.
fn upload_descriptor(file: &UploadedFile, options: &UploadOptions) -> Value {
    let actions: Vec<Value> = options
        .actions
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();

    json!({
        "data": {
            "type": file.mime_type,
            "name": file.name,
            "knowledgeBase": options.knowledge_base,
            "tags": options.tags,
            "data": {},
            "actions": actions,
        }
    })
}

fn chat_payload(request: &ChatRequest) -> Value {
    let sources: Vec<Value> = request
        .data_sources
        .iter()
        .map(|key| json!({ "id": key }))
        .collect();

    json!({
        "data": {
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": [AiMessage::user(request.prompt.clone())],
            "dataSources": sources,
            "options": {
                "model": { "id": request.model },
                "skipRag": request.skip_rag(),
                "ragOnly": false,
            }
        }
    })
}

/// The chat answer has moved around between API versions; take the first text we find.
fn extract_content(body: &Value) -> Option<String> {
    ["/data", "/content", "/message", "/data/content"]
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
        .map(str::to_string)
}

fn presigned_target(body: &Value) -> Option<(String, String)> {
    let scope = if body.get("uploadUrl").is_some() {
        body
    } else {
        body.get("data")?
    };
    let upload_url = scope.get("uploadUrl")?.as_str()?.to_string();
    let key = scope.get("key")?.as_str()?.to_string();
    Some((upload_url, key))
}

#[async_trait]
impl AiGateway for AmplifyClient {
    async fn upload_file(
        &self,
        file: &UploadedFile,
        options: &UploadOptions,
    ) -> Result<UploadResult, AiError> {
        let descriptor_failed = |detail: String| AiError::Upload {
            stage: "descriptor",
            detail,
        };

        let response = self
            .post_api("/files/upload", &upload_descriptor(file, options))
            .await
            .map_err(|e| descriptor_failed(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| descriptor_failed(e.to_string()))?;
        if !status.is_success() {
            return Err(descriptor_failed(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| descriptor_failed(format!("invalid JSON: {}", e)))?;
        let (upload_url, key) = presigned_target(&parsed)
            .ok_or_else(|| descriptor_failed("response carries no uploadUrl/key".to_string()))?;

        // Pre-signed URL: the signature is the credential, no bearer here
        let response = self
            .client
            .put(&upload_url)
            .header(CONTENT_TYPE, file.mime_type.as_str())
            .timeout(UPLOAD_TIMEOUT)
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|e| AiError::Upload {
                stage: "transfer",
                detail: e.to_string(),
            })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Upload {
                stage: "transfer",
                detail: format!("HTTP {}: {}", status, body),
            });
        }

        tracing::info!(file = %file.name, size = file.size(), key = %key, "File uploaded to AI service");
        Ok(UploadResult { key, upload_url })
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError> {
        tracing::debug!(
            sources = request.data_sources.len(),
            prompt_len = request.prompt.len(),
            "Sending chat request"
        );

        let response = self
            .post_api("/chat", &chat_payload(request))
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(AiError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        let content = extract_content(&body)
            .ok_or_else(|| AiError::InvalidResponse("no text content in chat response".to_string()))?;
        let success = body.get("success").and_then(Value::as_bool).unwrap_or(true);

        Ok(ChatResponse { success, content })
    }

    fn mode(&self) -> AiMode {
        AiMode::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::AiConfig;
    use crate::test_support::spawn_stub;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{post, put};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn pdf() -> UploadedFile {
        UploadedFile::new("week1.pdf", "application/pdf", b"%PDF-1.7".to_vec())
    }

    #[test]
    fn test_upload_descriptor_shape() {
        let descriptor = upload_descriptor(&pdf(), &UploadOptions::default());

        assert_eq!(descriptor["data"]["type"], "application/pdf");
        assert_eq!(descriptor["data"]["name"], "week1.pdf");
        assert_eq!(descriptor["data"]["knowledgeBase"], "default");
        assert_eq!(descriptor["data"]["actions"][0], json!({ "name": "saveAsData" }));
        assert_eq!(descriptor["data"]["actions"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_chat_payload_skips_rag_without_sources() {
        let config = AiConfig::default();
        let bare = chat_payload(&ChatRequest::new("hi".to_string(), vec![], &config));
        let attached = chat_payload(&ChatRequest::new(
            "hi".to_string(),
            vec!["k1".to_string()],
            &config,
        ));

        assert_eq!(bare["data"]["options"]["skipRag"], true);
        assert_eq!(attached["data"]["options"]["skipRag"], false);
        assert_eq!(attached["data"]["dataSources"], json!([{ "id": "k1" }]));
        assert_eq!(attached["data"]["messages"][0]["role"], "user");
        assert_eq!(attached["data"]["options"]["model"]["id"], "gpt-4o");
    }

    #[test]
    fn test_extract_content_variants() {
        assert_eq!(extract_content(&json!({ "data": "a" })).as_deref(), Some("a"));
        assert_eq!(extract_content(&json!({ "content": "b" })).as_deref(), Some("b"));
        assert_eq!(extract_content(&json!({ "message": "c" })).as_deref(), Some("c"));
        assert_eq!(
            extract_content(&json!({ "data": { "content": "d" } })).as_deref(),
            Some("d")
        );
        assert_eq!(extract_content(&json!({ "data": 3 })), None);
    }

    async fn upload_stub(transfer_status: StatusCode, seen: Arc<Mutex<Vec<String>>>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let upload_url = format!("{}/presigned/abc", base);
        let (s1, s2) = (Arc::clone(&seen), seen);

        let router = Router::new()
            .route(
                "/files/upload",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    s1.lock().unwrap().push(format!(
                        "descriptor {} {}",
                        body["data"]["name"],
                        headers.contains_key("authorization")
                    ));
                    let upload_url = upload_url.clone();
                    async move {
                        Json(json!({ "success": true, "uploadUrl": upload_url, "key": "user/abc.json" }))
                    }
                }),
            )
            .route(
                "/presigned/abc",
                put(move |headers: HeaderMap, body: Bytes| {
                    s2.lock().unwrap().push(format!(
                        "put {} {}",
                        body.len(),
                        headers.contains_key("authorization")
                    ));
                    async move { transfer_status }
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        base
    }

    #[tokio::test]
    async fn test_upload_puts_bytes_to_presigned_url_without_bearer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base = upload_stub(StatusCode::OK, Arc::clone(&seen)).await;
        let client = AmplifyClient::new(base, "amp-key").unwrap();

        let result = client
            .upload_file(&pdf(), &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(result.key, "user/abc.json");
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["descriptor \"week1.pdf\" true", "put 8 false"]
        );
    }

    #[tokio::test]
    async fn test_failed_transfer_is_upload_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base = upload_stub(StatusCode::FORBIDDEN, seen).await;
        let client = AmplifyClient::new(base, "amp-key").unwrap();

        let err = client
            .upload_file(&pdf(), &UploadOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Upload { stage: "transfer", .. }));
    }

    #[tokio::test]
    async fn test_chat_reads_nested_content() {
        let router = Router::new().route(
            "/chat",
            post(|Json(body): Json<Value>| async move {
                let prompt = body["data"]["messages"][0]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "success": true, "data": { "content": format!("echo: {}", prompt) } }))
            }),
        );
        let base = spawn_stub(router).await;
        let client = AmplifyClient::new(base, "amp-key").unwrap();

        let request = ChatRequest::new("hello".to_string(), vec![], &AiConfig::default());
        let response = client.chat(&request).await.unwrap();

        assert!(response.success);
        assert_eq!(response.content, "echo: hello");
    }

    #[tokio::test]
    async fn test_chat_error_status_is_upstream() {
        let router = Router::new().route(
            "/chat",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = spawn_stub(router).await;
        let client = AmplifyClient::new(base, "amp-key").unwrap();

        let request = ChatRequest::new("hello".to_string(), vec![], &AiConfig::default());
        assert!(matches!(
            client.chat(&request).await,
            Err(AiError::Upstream { status: 502, .. })
        ));
    }
}
