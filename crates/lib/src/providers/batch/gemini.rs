use crate::errors::BatchError;
use crate::providers::batch::{BatchService, RemoteJobStatus};
use crate::types::{ExtractionOutput, ExtractionRequest};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// --- Gemini batch request structures (inline mode) ---

#[derive(Serialize)]
struct CreateBatchRequest {
    batch: BatchSpec,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSpec {
    display_name: String,
    input_config: InputConfig,
}

#[derive(Serialize)]
struct InputConfig {
    requests: InlineRequests,
}

#[derive(Serialize)]
struct InlineRequests {
    requests: Vec<InlineRequest>,
}

#[derive(Serialize)]
struct InlineRequest {
    request: GenerateContentRequest,
    metadata: RequestMetadata,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct RequestMetadata {
    key: String,
}

// --- Gemini batch response structures ---

#[derive(Deserialize, Debug)]
struct BatchOperation {
    name: String,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<OperationResponse>,
}

#[derive(Deserialize, Debug)]
struct OperationMetadata {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    inlined_responses: Option<InlinedResponses>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlinedResponses {
    #[serde(default)]
    inlined_responses: Vec<InlinedResponse>,
}

#[derive(Deserialize, Debug)]
struct InlinedResponse {
    #[serde(default)]
    metadata: Option<RequestMetadata>,
    #[serde(default)]
    response: Option<GenerateContentResponse>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: ContentResponse,
}

#[derive(Deserialize, Debug)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize, Debug)]
struct PartResponse {
    #[serde(default)]
    text: Option<String>,
}

// --- Gemini batch provider implementation ---

/// A provider for the Google Gemini batch API in inline mode: requests are
/// embedded in the create call and outputs are read back from the operation
/// resource, so no file storage round-trip is involved. Each request carries
/// its id in `metadata.key`, which is the only correlation channel the
/// orchestrator relies on.
#[derive(Clone, Debug)]
pub struct GeminiBatchProvider {
    client: ReqwestClient,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiBatchProvider {
    /// Creates a new provider. `base_url` is the API root without a trailing
    /// slash, e.g. `https://generativelanguage.googleapis.com`.
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self, BatchError> {
        if api_key.is_empty() {
            return Err(BatchError::MissingApiKey);
        }
        let client = ReqwestClient::builder()
            .build()
            .map_err(BatchError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    /// Reads one attachment from disk and builds its inline request.
    async fn build_inline_request(
        &self,
        request: &ExtractionRequest,
    ) -> Result<InlineRequest, BatchError> {
        let bytes = tokio::fs::read(&request.attached_path)
            .await
            .map_err(|source| BatchError::Attachment {
                path: request.attached_path.clone(),
                source,
            })?;
        let encoded = general_purpose::STANDARD.encode(bytes);
        Ok(InlineRequest {
            request: GenerateContentRequest {
                contents: vec![Content {
                    parts: vec![
                        Part::Text(request.prompt.clone()),
                        Part::InlineData(InlineData {
                            mime_type: "application/pdf".to_string(),
                            data: encoded,
                        }),
                    ],
                }],
            },
            metadata: RequestMetadata {
                key: request.request_id.clone(),
            },
        })
    }

    /// Fetches the operation resource for a job.
    async fn get_operation(&self, job_id: &str) -> Result<BatchOperation, BatchError> {
        let url = format!("{}/v1beta/{job_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("key", &self.api_key)])
            .send()
            .await
            .map_err(BatchError::Request)?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BatchError::Api(error_text));
        }

        response.json().await.map_err(BatchError::Deserialization)
    }
}

#[async_trait]
impl BatchService for GeminiBatchProvider {
    async fn submit(&self, requests: &[ExtractionRequest]) -> Result<String, BatchError> {
        let mut inline_requests = Vec::with_capacity(requests.len());
        for request in requests {
            inline_requests.push(self.build_inline_request(request).await?);
        }

        let request_body = CreateBatchRequest {
            batch: BatchSpec {
                display_name: "citation-extraction".to_string(),
                input_config: InputConfig {
                    requests: InlineRequests {
                        requests: inline_requests,
                    },
                },
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:batchGenerateContent",
            self.base_url, self.model
        );
        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&request_body)
            .send()
            .await
            .map_err(BatchError::Request)?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BatchError::Api(error_text));
        }

        let operation: BatchOperation = response
            .json()
            .await
            .map_err(BatchError::Deserialization)?;
        debug!("[submit] created batch job '{}'", operation.name);
        Ok(operation.name)
    }

    async fn poll(&self, job_id: &str) -> Result<RemoteJobStatus, BatchError> {
        let operation = self.get_operation(job_id).await?;

        if let Some(error) = operation.error {
            return Ok(RemoteJobStatus::Failed {
                message: error.message,
            });
        }

        let state = operation
            .metadata
            .and_then(|m| m.state)
            .unwrap_or_default();
        let status = match state.as_str() {
            "BATCH_STATE_PENDING" => RemoteJobStatus::Pending,
            "BATCH_STATE_SUCCEEDED" => RemoteJobStatus::Succeeded,
            "BATCH_STATE_FAILED" | "BATCH_STATE_CANCELLED" | "BATCH_STATE_EXPIRED" => {
                RemoteJobStatus::Failed {
                    message: format!("batch job ended in state {state}"),
                }
            }
            // Anything unrecognized is still in flight as far as we know.
            _ => RemoteJobStatus::Running,
        };
        Ok(status)
    }

    async fn fetch_outputs(&self, job_id: &str) -> Result<Vec<ExtractionOutput>, BatchError> {
        let operation = self.get_operation(job_id).await?;
        let inlined = operation
            .response
            .and_then(|r| r.inlined_responses)
            .map(|r| r.inlined_responses)
            .unwrap_or_default();

        let mut outputs = Vec::with_capacity(inlined.len());
        for entry in inlined {
            let Some(metadata) = entry.metadata else {
                warn!("[fetch_outputs] dropping response without a correlation key");
                continue;
            };
            let output = match (entry.response, entry.error) {
                (_, Some(error)) => ExtractionOutput::failed(&metadata.key, &error.message),
                (Some(response), None) => match first_text(&response) {
                    Some(text) => ExtractionOutput {
                        request_id: metadata.key,
                        succeeded: true,
                        extracted_text: Some(strip_markdown_fences(&text)),
                        error_detail: None,
                    },
                    None => ExtractionOutput::failed(&metadata.key, "response contained no text"),
                },
                (None, None) => ExtractionOutput::failed(&metadata.key, "empty response entry"),
            };
            outputs.push(output);
        }
        Ok(outputs)
    }
}

fn first_text(response: &GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .first()
        .and_then(|c| c.content.parts.iter().find_map(|p| p.text.clone()))
}

/// Models often wrap a JSON answer in a markdown fence; strip it so the
/// report carries the payload itself.
fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_prefix = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let without_suffix = without_prefix
        .strip_suffix("```")
        .unwrap_or(without_prefix);
    without_suffix.trim().to_string()
}
