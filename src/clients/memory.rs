use super::{SimilarityClient, TagServiceClient};
use crate::core::models::{SimilarMatch, Tag, TagId, Video, VideoId};
use crate::error::ClientError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
struct StoreState {
    videos: BTreeMap<VideoId, Video>,
    tags: BTreeMap<TagId, Tag>,
    next_tag_id: TagId,
    failing_videos: HashSet<VideoId>,
    failing_deletes: HashSet<TagId>,
    failing_searches: HashMap<String, ClientError>,
    detached_on_remove: HashSet<VideoId>,
    unavailable: bool,
    writes: usize,
}

impl StoreState {
    fn register_tag(&mut self, tag: &Tag) {
        self.tags.entry(tag.id).or_insert_with(|| tag.clone());
        self.next_tag_id = self.next_tag_id.max(tag.id + 1);
    }

    fn tag_named(&mut self, name: &str) -> Tag {
        if let Some(tag) = self.tags.values().find(|t| t.name == name) {
            return tag.clone();
        }
        let id = self.next_tag_id.max(1);
        self.next_tag_id = id + 1;
        let tag = Tag::new(id, name);
        self.tags.insert(id, tag.clone());
        tag
    }

    fn check_available(&self) -> Result<(), ClientError> {
        if self.unavailable {
            return Err(ClientError::Unavailable(
                "in-memory tag service is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn begin_write(&mut self, video_id: Option<VideoId>) -> Result<(), ClientError> {
        self.check_available()?;
        self.writes += 1;
        if let Some(id) = video_id {
            if self.failing_videos.contains(&id) {
                return Err(ClientError::Network(format!(
                    "injected write failure for video {}",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// Tag/video store held entirely in process memory.
///
/// Behaves like the remote service (tags created on first use, unknown tags
/// searchable as empty) and supports failure injection for exercising
/// partial-completion paths.
#[derive(Debug, Default)]
pub struct InMemoryTagService {
    state: Mutex<StoreState>,
}

impl InMemoryTagService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with untagged videos.
    pub fn with_videos(ids: impl IntoIterator<Item = VideoId>) -> Self {
        let videos = ids.into_iter().map(|id| (id, Video::new(id))).collect();
        Self {
            state: Mutex::new(StoreState {
                videos,
                next_tag_id: 1,
                ..StoreState::default()
            }),
        }
    }

    /// Insert or replace a video, registering any tags it carries.
    pub async fn insert_video(&self, video: Video) {
        let mut state = self.state.lock().await;
        for tag in &video.tags {
            state.register_tag(tag);
        }
        state.videos.insert(video.id, video);
    }

    /// Attach `label` to each member without counting as service writes.
    pub async fn seed_group(&self, label: &str, members: &[VideoId]) -> Tag {
        let mut state = self.state.lock().await;
        let tag = state.tag_named(label);
        for id in members {
            state
                .videos
                .entry(*id)
                .or_insert_with(|| Video::new(*id))
                .insert_tag(tag.clone());
        }
        tag
    }

    /// Make every subsequent add/remove for `video_id` fail with a network error.
    pub async fn fail_writes_for(&self, video_id: VideoId) {
        self.state.lock().await.failing_videos.insert(video_id);
    }

    /// Make every subsequent delete of `tag_id` fail with a network error.
    pub async fn fail_deletes_for(&self, tag_id: TagId) {
        self.state.lock().await.failing_deletes.insert(tag_id);
    }

    /// Make searches for `tag_name` fail with `error`.
    pub async fn fail_searches_for(&self, tag_name: &str, error: ClientError) {
        self.state
            .lock()
            .await
            .failing_searches
            .insert(tag_name.to_string(), error);
    }

    /// Removals on `video_id` find the tag already detached by another writer:
    /// the tag comes off and the call reports NotFound.
    pub async fn detach_before_remove(&self, video_id: VideoId) {
        self.state.lock().await.detached_on_remove.insert(video_id);
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.failing_videos.clear();
        state.failing_deletes.clear();
        state.failing_searches.clear();
        state.detached_on_remove.clear();
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Number of mutating calls received, successful or not.
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }

    pub async fn snapshot(&self, video_id: VideoId) -> Option<Video> {
        self.state.lock().await.videos.get(&video_id).cloned()
    }
}

#[async_trait]
impl TagServiceClient for InMemoryTagService {
    async fn list_tags(&self) -> Result<Vec<Tag>, ClientError> {
        let state = self.state.lock().await;
        state.check_available()?;
        Ok(state.tags.values().cloned().collect())
    }

    async fn add_tag_to_video(
        &self,
        video_id: VideoId,
        tag_name: &str,
    ) -> Result<Tag, ClientError> {
        let mut state = self.state.lock().await;
        state.begin_write(Some(video_id))?;
        if !state.videos.contains_key(&video_id) {
            return Err(ClientError::not_found(format!("video {}", video_id)));
        }

        let tag = state.tag_named(tag_name);
        if let Some(video) = state.videos.get_mut(&video_id) {
            video.insert_tag(tag.clone());
        }
        Ok(tag)
    }

    async fn remove_tag_from_video(
        &self,
        video_id: VideoId,
        tag_id: TagId,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.begin_write(Some(video_id))?;
        let raced = state.detached_on_remove.contains(&video_id);
        let video = state
            .videos
            .get_mut(&video_id)
            .ok_or_else(|| ClientError::not_found(format!("video {}", video_id)))?;

        if video.remove_tag(tag_id) && !raced {
            Ok(())
        } else {
            Err(ClientError::not_found(format!(
                "tag {} on video {}",
                tag_id, video_id
            )))
        }
    }

    async fn delete_tag(&self, tag_id: TagId) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.begin_write(None)?;
        if state.failing_deletes.contains(&tag_id) {
            return Err(ClientError::Network(format!(
                "injected delete failure for tag {}",
                tag_id
            )));
        }
        if state.tags.remove(&tag_id).is_none() {
            return Err(ClientError::not_found(format!("tag {}", tag_id)));
        }
        for video in state.videos.values_mut() {
            video.remove_tag(tag_id);
        }
        Ok(())
    }

    async fn find_videos_by_tag(&self, tag_name: &str) -> Result<Vec<Video>, ClientError> {
        let state = self.state.lock().await;
        state.check_available()?;
        if let Some(error) = state.failing_searches.get(tag_name) {
            return Err(error.clone());
        }
        Ok(state
            .videos
            .values()
            .filter(|v| v.has_tag_named(tag_name))
            .cloned()
            .collect())
    }

    async fn get_video(&self, video_id: VideoId) -> Result<Video, ClientError> {
        let state = self.state.lock().await;
        state.check_available()?;
        state
            .videos
            .get(&video_id)
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("video {}", video_id)))
    }
}

/// Similarity table backed by an [`InMemoryTagService`] for video state.
#[derive(Debug)]
pub struct InMemorySimilarity {
    store: Arc<InMemoryTagService>,
    edges: RwLock<BTreeMap<VideoId, Vec<(VideoId, f64)>>>,
}

impl InMemorySimilarity {
    pub fn new(store: Arc<InMemoryTagService>) -> Self {
        Self {
            store,
            edges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record that `a` and `b` are similar with `score`, in both directions.
    pub async fn add_match(&self, a: VideoId, b: VideoId, score: f64) {
        let mut edges = self.edges.write().await;
        edges.entry(a).or_default().push((b, score));
        edges.entry(b).or_default().push((a, score));
    }
}

#[async_trait]
impl SimilarityClient for InMemorySimilarity {
    async fn find_matches(
        &self,
        video_id: VideoId,
        threshold: f64,
    ) -> Result<Vec<SimilarMatch>, ClientError> {
        let candidates: Vec<(VideoId, f64)> = {
            let edges = self.edges.read().await;
            edges
                .get(&video_id)
                .map(|list| {
                    list.iter()
                        .copied()
                        .filter(|(_, score)| *score >= threshold)
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut matches = Vec::with_capacity(candidates.len());
        for (id, score) in candidates {
            match self.store.snapshot(id).await {
                Some(video) => matches.push(SimilarMatch {
                    video,
                    similarity_score: score,
                }),
                None => log::debug!("Similarity match {} no longer exists, skipping", id),
            }
        }
        Ok(matches)
    }
}
