use super::{SimilarityClient, TagServiceClient};
use crate::config::AppConfig;
use crate::core::models::{SimilarMatch, Tag, TagId, Video, VideoId};
use crate::error::ClientError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct AddTagRequest<'a> {
    name: &'a str,
}

/// Shared request plumbing for the REST collaborators.
#[derive(Debug, Clone)]
struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        log::debug!("{} -> {}", resource, status);

        match status {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ClientError::not_found(resource)),
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => Err(
                ClientError::Unavailable(format!("{} returned {}", resource, status)),
            ),
            _ => Err(ClientError::Network(format!(
                "{} returned {}",
                resource, status
            ))),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, ClientError> {
        let response = self.send(request, resource).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("{}: {}", resource, e)))
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    // A connect timeout is also `is_connect`; timeouts count as network failures.
    if err.is_timeout() {
        ClientError::Network(err.to_string())
    } else if err.is_connect() {
        ClientError::Unavailable(err.to_string())
    } else if err.is_decode() {
        ClientError::InvalidResponse(err.to_string())
    } else {
        ClientError::Network(err.to_string())
    }
}

/// [`TagServiceClient`] talking to the REST tag/video service.
#[derive(Debug, Clone)]
pub struct HttpTagService {
    rest: RestClient,
}

impl HttpTagService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Self::new(&config.tag_service_url, config.request_timeout())
    }
}

#[async_trait]
impl TagServiceClient for HttpTagService {
    async fn list_tags(&self) -> Result<Vec<Tag>, ClientError> {
        let request = self.rest.client.get(self.rest.url("/api/tags"));
        self.rest.get_json(request, "tags").await
    }

    async fn add_tag_to_video(
        &self,
        video_id: VideoId,
        tag_name: &str,
    ) -> Result<Tag, ClientError> {
        let request = self
            .rest
            .client
            .post(self.rest.url(&format!("/api/videos/{}/tags", video_id)))
            .json(&AddTagRequest { name: tag_name });
        self.rest
            .get_json(request, &format!("video {}", video_id))
            .await
    }

    async fn remove_tag_from_video(
        &self,
        video_id: VideoId,
        tag_id: TagId,
    ) -> Result<(), ClientError> {
        let request = self.rest.client.delete(
            self.rest
                .url(&format!("/api/videos/{}/tags/{}", video_id, tag_id)),
        );
        self.rest
            .send(request, &format!("tag {} on video {}", tag_id, video_id))
            .await?;
        Ok(())
    }

    async fn delete_tag(&self, tag_id: TagId) -> Result<(), ClientError> {
        let request = self
            .rest
            .client
            .delete(self.rest.url(&format!("/api/tags/{}", tag_id)));
        self.rest.send(request, &format!("tag {}", tag_id)).await?;
        Ok(())
    }

    async fn find_videos_by_tag(&self, tag_name: &str) -> Result<Vec<Video>, ClientError> {
        let request = self
            .rest
            .client
            .get(self.rest.url("/api/videos"))
            .query(&[("tag", tag_name)]);

        match self
            .rest
            .get_json(request, &format!("videos tagged {}", tag_name))
            .await
        {
            Err(ClientError::NotFound { .. }) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn get_video(&self, video_id: VideoId) -> Result<Video, ClientError> {
        let request = self
            .rest
            .client
            .get(self.rest.url(&format!("/api/videos/{}", video_id)));
        self.rest
            .get_json(request, &format!("video {}", video_id))
            .await
    }
}

/// [`SimilarityClient`] talking to the REST similarity endpoint.
#[derive(Debug, Clone)]
pub struct HttpSimilarityClient {
    rest: RestClient,
}

impl HttpSimilarityClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            rest: RestClient::new(base_url, timeout)?,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Self::new(config.similarity_service_url(), config.request_timeout())
    }
}

#[async_trait]
impl SimilarityClient for HttpSimilarityClient {
    async fn find_matches(
        &self,
        video_id: VideoId,
        threshold: f64,
    ) -> Result<Vec<SimilarMatch>, ClientError> {
        let request = self
            .rest
            .client
            .get(self.rest.url(&format!("/api/videos/{}/similar", video_id)))
            .query(&[("threshold", threshold)]);
        self.rest
            .get_json(request, &format!("matches for video {}", video_id))
            .await
    }
}
