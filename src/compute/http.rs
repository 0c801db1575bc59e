//! HTTP client for the remote compute platform.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::job::{JobSpec, JobStatusReport};
use super::{CacheableRepertoire, CacheableStudy, ComputeClient};
use crate::error::ComputeError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// reqwest-backed [`ComputeClient`].
pub struct HttpComputeClient {
    base_url: String,
    token: Option<String>,
    http_client: Client,
}

#[derive(Serialize)]
struct DirectoryRequest<'a> {
    path: &'a str,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl HttpComputeClient {
    /// Creates a client for the platform at `base_url`.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ComputeError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ComputeError::RequestFailed(format!("failed to build client: {}", e)))?;

        Ok(Self {
            base_url,
            token,
            http_client,
        })
    }

    /// Reads `STATS_CACHE_COMPUTE_URL` (required) and `STATS_CACHE_COMPUTE_TOKEN`.
    pub fn from_env() -> Result<Self, ComputeError> {
        let base_url = env::var("STATS_CACHE_COMPUTE_URL").map_err(|_| ComputeError::MissingBaseUrl)?;
        let token = env::var("STATS_CACHE_COMPUTE_TOKEN").ok();
        Self::new(base_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ComputeError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| ComputeError::RequestFailed(e.to_string()))
    }

    /// Turns a non-success response into an `ApiError`.
    async fn check(response: Response) -> Result<Response, ComputeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);

        Err(ComputeError::ApiError {
            code: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ComputeError> {
        let response = self.send(self.http_client.get(self.url(path))).await?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ComputeError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn list_cacheable_studies(
        &self,
        repository_id: &str,
    ) -> Result<Vec<CacheableStudy>, ComputeError> {
        self.get_json(&format!(
            "/repositories/{}/studies?cacheable=true",
            urlencoding::encode(repository_id)
        ))
        .await
    }

    async fn list_cacheable_repertoires(
        &self,
        repository_id: &str,
        study_id: &str,
    ) -> Result<Vec<CacheableRepertoire>, ComputeError> {
        self.get_json(&format!(
            "/repositories/{}/studies/{}/repertoires?cacheable=true",
            urlencoding::encode(repository_id),
            urlencoding::encode(study_id)
        ))
        .await
    }

    async fn ensure_directory(&self, path: &str) -> Result<(), ComputeError> {
        let request = self
            .http_client
            .put(self.url("/files/directories"))
            .json(&DirectoryRequest { path });
        let response = self.send(request).await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn submit_job(&self, spec: &JobSpec) -> Result<String, ComputeError> {
        let request = self.http_client.post(self.url("/jobs")).json(spec);
        let response = Self::check(self.send(request).await?).await?;
        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ComputeError::ParseError(e.to_string()))?;
        Ok(body.id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<JobStatusReport, ComputeError> {
        let request = self
            .http_client
            .get(self.url(&format!("/jobs/{}", urlencoding::encode(job_id))));
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ComputeError::JobNotFound(job_id.to_string()));
        }
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ComputeError::ParseError(e.to_string()))
    }

    async fn read_artifact(&self, path: &str) -> Result<Option<Vec<u8>>, ComputeError> {
        let request = self
            .http_client
            .get(self.url(&format!("/files/content?path={}", urlencoding::encode(path))));
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = Self::check(response)
            .await?
            .bytes()
            .await
            .map_err(|e| ComputeError::RequestFailed(e.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn delete_artifact(&self, path: &str) -> Result<(), ComputeError> {
        let request = self
            .http_client
            .delete(self.url(&format!("/files?path={}", urlencoding::encode(path))));
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_new() {
        let client =
            HttpComputeClient::new("https://compute.example.org/", Some("token".to_string()))
                .unwrap();
        assert_eq!(client.base_url(), "https://compute.example.org");
        assert!(client.has_token());
        assert_eq!(client.url("/jobs"), "https://compute.example.org/jobs");
    }

    #[test]
    fn test_client_without_token() {
        let client = HttpComputeClient::new("http://localhost:9000", None).unwrap();
        assert!(!client.has_token());
    }

    #[tokio::test]
    async fn test_connection_error_is_request_failed() {
        let client = HttpComputeClient::new("http://localhost:65535", None).unwrap();
        let err = client.get_job_status("job-1").await.unwrap_err();
        assert!(matches!(err, ComputeError::RequestFailed(_)));
    }
}
