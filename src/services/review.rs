use crate::clients::TagServiceClient;
use crate::core::models::{GroupTag, Video};
use crate::error::ClientError;
use crate::error::GroupResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

const LEAD_PERCENT: u8 = 100;
const FIRST_FOLLOWER_PERCENT: u8 = 95;
const PERCENT_STEP: u8 = 2;
const FLOOR_PERCENT: u8 = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewMember {
    pub video: Video,
    /// Display approximation only; true pairwise scores are not kept once a
    /// group exists.
    pub similarity_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewGroup {
    pub label: String,
    pub members: Vec<ReviewMember>,
}

impl ReviewGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSnapshot {
    pub taken_at: DateTime<Utc>,
    pub groups: Vec<ReviewGroup>,
    /// Groups whose members could not be fetched.
    pub skipped: Vec<String>,
}

impl ReviewSnapshot {
    pub fn total_members(&self) -> usize {
        self.groups.iter().map(ReviewGroup::len).sum()
    }
}

/// Placeholder percentage for the member at `position` within its group.
pub fn placeholder_percent(position: usize) -> u8 {
    if position == 0 {
        return LEAD_PERCENT;
    }
    let drop = (position - 1).saturating_mul(PERCENT_STEP as usize);
    let percent = (FIRST_FOLLOWER_PERCENT as usize).saturating_sub(drop);
    percent.max(FLOOR_PERCENT as usize) as u8
}

/// Read-only reconstruction of every current duplicate group from tag state.
pub struct DuplicateReviewSession {
    tags: Arc<dyn TagServiceClient>,
}

impl DuplicateReviewSession {
    pub fn new(tags: Arc<dyn TagServiceClient>) -> Self {
        Self { tags }
    }

    /// Current groups, largest first.
    pub async fn load(&self) -> GroupResult<Vec<ReviewGroup>> {
        Ok(self.snapshot().await?.groups)
    }

    pub async fn snapshot(&self) -> GroupResult<ReviewSnapshot> {
        let group_tags: Vec<GroupTag> = self
            .tags
            .list_tags()
            .await?
            .into_iter()
            .filter_map(|tag| GroupTag::try_from(tag).ok())
            .collect();
        log::debug!("Found {} group tag(s)", group_tags.len());

        let mut groups = Vec::with_capacity(group_tags.len());
        let mut skipped = Vec::new();
        for group in group_tags {
            let videos = match self.tags.find_videos_by_tag(group.label()).await {
                Ok(videos) => videos,
                Err(e @ ClientError::Unavailable(_)) => return Err(e.into()),
                Err(e) => {
                    log::warn!("Failed to load members of {}: {}", group, e);
                    skipped.push(group.label().to_string());
                    continue;
                }
            };
            if videos.is_empty() {
                log::debug!("Group {} has no members, leaving it out", group);
                continue;
            }

            let members = videos
                .into_iter()
                .enumerate()
                .map(|(position, video)| ReviewMember {
                    video,
                    similarity_percent: placeholder_percent(position),
                })
                .collect();
            groups.push(ReviewGroup {
                label: group.into_tag().name,
                members,
            });
        }

        groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.label.cmp(&b.label)));

        Ok(ReviewSnapshot {
            taken_at: Utc::now(),
            groups,
            skipped,
        })
    }
}
