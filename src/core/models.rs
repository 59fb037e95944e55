use crate::core::identity::{GROUP_LABEL_PREFIX, is_group_label};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type VideoId = i64;
pub type TagId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Tag {
    pub fn new(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
        }
    }

    pub fn is_group_tag(&self) -> bool {
        is_group_label(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Video {
    pub fn new(id: VideoId) -> Self {
        Self {
            id,
            title: None,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(id: VideoId, tags: Vec<Tag>) -> Self {
        let mut video = Self::new(id);
        for tag in tags {
            video.insert_tag(tag);
        }
        video
    }

    pub fn has_tag_id(&self, tag_id: TagId) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }

    pub fn has_tag_named(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }

    /// Insert `tag` unless a tag with the same id is already present.
    /// Returns whether the tag set changed.
    pub fn insert_tag(&mut self, tag: Tag) -> bool {
        if self.has_tag_id(tag.id) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Remove every tag entry carrying `tag_id`. Returns whether the tag set changed.
    pub fn remove_tag(&mut self, tag_id: TagId) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.id != tag_id);
        self.tags.len() != before
    }

    pub fn group_tags(&self) -> Vec<GroupTag> {
        self.tags
            .iter()
            .filter_map(|t| GroupTag::try_from(t.clone()).ok())
            .collect()
    }
}

/// A tag whose name follows the `dup-{n}v-{hex}` convention.
///
/// Only constructible through the label pattern check, so holding a `GroupTag`
/// means the name has already been validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GroupTag(Tag);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tag name is not a duplicate group label: {name}")]
pub struct NotAGroupTag {
    pub name: String,
}

impl GroupTag {
    pub fn parse(tag: Tag) -> Result<Self, NotAGroupTag> {
        if is_group_label(&tag.name) {
            Ok(Self(tag))
        } else {
            Err(NotAGroupTag { name: tag.name })
        }
    }

    pub fn id(&self) -> TagId {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.name
    }

    /// Member count recorded in the label when the group was created.
    pub fn member_count(&self) -> usize {
        self.0
            .name
            .strip_prefix(GROUP_LABEL_PREFIX)
            .and_then(|rest| rest.split_once("v-"))
            .and_then(|(count, _)| count.parse().ok())
            .unwrap_or(0)
    }

    pub fn tag(&self) -> &Tag {
        &self.0
    }

    pub fn into_tag(self) -> Tag {
        self.0
    }
}

impl TryFrom<Tag> for GroupTag {
    type Error = NotAGroupTag;

    fn try_from(tag: Tag) -> Result<Self, Self::Error> {
        GroupTag::parse(tag)
    }
}

impl fmt::Display for GroupTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// A candidate returned by the similarity service for a probe video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub video: Video,
    #[serde(alias = "similarityScore")]
    pub similarity_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_tag_dedupes_by_id() {
        let mut video = Video::new(1);
        assert!(video.insert_tag(Tag::new(10, "favorite")));
        assert!(!video.insert_tag(Tag::new(10, "renamed")));
        assert_eq!(video.tags.len(), 1);
        assert_eq!(video.tags[0].name, "favorite");
    }

    #[test]
    fn test_remove_tag() {
        let mut video = Video::with_tags(1, vec![Tag::new(10, "a"), Tag::new(11, "b")]);
        assert!(video.remove_tag(10));
        assert!(!video.remove_tag(10));
        assert_eq!(video.tags, vec![Tag::new(11, "b")]);
    }

    #[test]
    fn test_group_tag_validation() {
        assert!(GroupTag::parse(Tag::new(1, "dup-3v-2e3f")).is_ok());
        assert!(GroupTag::parse(Tag::new(1, "dup-2v-aaaa")).is_ok());
        assert!(GroupTag::parse(Tag::new(1, "dup-3v-")).is_err());
        assert!(GroupTag::parse(Tag::new(1, "dup-3v-XYZ1")).is_err());
        assert!(GroupTag::parse(Tag::new(1, "duplicate")).is_err());

        let err = GroupTag::parse(Tag::new(1, "holiday")).unwrap_err();
        assert_eq!(err.name, "holiday");
    }

    #[test]
    fn test_group_tag_member_count() {
        let group = GroupTag::parse(Tag::new(1, "dup-12v-abcd")).unwrap();
        assert_eq!(group.member_count(), 12);
        assert_eq!(group.label(), "dup-12v-abcd");
        assert_eq!(group.to_string(), "dup-12v-abcd");
    }

    #[test]
    fn test_group_tags_filters_plain_tags() {
        let video = Video::with_tags(
            4,
            vec![
                Tag::new(1, "holiday"),
                Tag::new(2, "dup-2v-aaaa"),
                Tag::new(3, "dup-notes"),
            ],
        );
        let groups = video.group_tags();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id(), 2);
    }

    #[test]
    fn test_video_deserializes_without_optional_fields() {
        let video: Video = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(video.id, 7);
        assert!(video.tags.is_empty());

        let found: SimilarMatch =
            serde_json::from_str(r#"{"video": {"id": 8}, "similarityScore": 0.91}"#).unwrap();
        assert_eq!(found.video.id, 8);
        assert_eq!(found.similarity_score, 0.91);
    }
}
