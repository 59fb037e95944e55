//! Duplicate-group identity and reconciliation for a tag-based media catalog.
//!
//! Groups of near-duplicate videos are never stored as such: a group is the
//! set of videos holding one `dup-{n}v-{hex}` tag on the remote tag service.
//! This crate derives those labels, applies and merges them, and keeps local
//! caches of the catalog in step with the service.

pub mod clients;
pub mod config;
pub mod core;
pub mod error;
pub mod services;

pub use crate::clients::{SimilarityClient, TagServiceClient};
pub use crate::config::AppConfig;
pub use crate::core::{GroupIdentity, GroupTag, SimilarMatch, Tag, TagId, Video, VideoId};
pub use crate::error::{ClientError, GroupError};
pub use crate::services::{
    CacheSync, DuplicateReconciler, DuplicateReviewSession, GroupMerger, GroupTagger, TagAction,
    VideoCollections,
};
