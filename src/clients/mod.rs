pub mod http;
pub mod memory;

pub use http::{HttpSimilarityClient, HttpTagService};
pub use memory::{InMemorySimilarity, InMemoryTagService};

use crate::core::models::{SimilarMatch, Tag, TagId, Video, VideoId};
use crate::error::ClientError;
use async_trait::async_trait;

/// Remote service owning tags and their associations with videos.
#[async_trait]
pub trait TagServiceClient: Send + Sync {
    async fn list_tags(&self) -> Result<Vec<Tag>, ClientError>;

    /// Associate `tag_name` with a video, creating the tag on first use.
    async fn add_tag_to_video(&self, video_id: VideoId, tag_name: &str)
    -> Result<Tag, ClientError>;

    async fn remove_tag_from_video(&self, video_id: VideoId, tag_id: TagId)
    -> Result<(), ClientError>;

    async fn delete_tag(&self, tag_id: TagId) -> Result<(), ClientError>;

    /// Videos currently holding `tag_name`. Unknown tags yield an empty list.
    async fn find_videos_by_tag(&self, tag_name: &str) -> Result<Vec<Video>, ClientError>;

    async fn get_video(&self, video_id: VideoId) -> Result<Video, ClientError>;
}

/// External near-duplicate search.
#[async_trait]
pub trait SimilarityClient: Send + Sync {
    async fn find_matches(
        &self,
        video_id: VideoId,
        threshold: f64,
    ) -> Result<Vec<SimilarMatch>, ClientError>;
}
