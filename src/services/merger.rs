use super::locks::{GroupLocks, LabelGuards};
use crate::clients::TagServiceClient;
use crate::core::identity::GroupIdentity;
use crate::core::models::{Tag, TagId, Video, VideoId};
use crate::error::GroupResult;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub label: String,
    pub final_members: BTreeSet<VideoId>,
    /// Stale group labels taken off at least one member.
    pub removed_labels: BTreeSet<String>,
    /// Stale group labels deleted from the service after losing their last member.
    pub deleted_labels: BTreeSet<String>,
    /// The canonical tag, when known from the service.
    pub tag: Option<Tag>,
    /// Members that received the canonical tag during this merge.
    pub retagged_ids: BTreeSet<VideoId>,
    /// Every `(video, stale tag)` association removed during this merge.
    pub detached: Vec<(VideoId, Tag)>,
    /// Members whose retagging did not fully complete.
    pub failed: usize,
}

impl MergeOutcome {
    fn new(label: String, final_members: BTreeSet<VideoId>) -> Self {
        Self {
            label,
            final_members,
            removed_labels: BTreeSet::new(),
            deleted_labels: BTreeSet::new(),
            tag: None,
            retagged_ids: BTreeSet::new(),
            detached: Vec::new(),
            failed: 0,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Debug)]
struct Expansion {
    known: BTreeMap<VideoId, Video>,
    accumulator: BTreeSet<VideoId>,
    labels: BTreeSet<String>,
    label: String,
}

impl Expansion {
    fn lock_keys(&self) -> impl Iterator<Item = &String> {
        self.labels.iter().chain(std::iter::once(&self.label))
    }
}

pub struct GroupMerger {
    tags: Arc<dyn TagServiceClient>,
    locks: Arc<GroupLocks>,
}

impl GroupMerger {
    pub fn new(tags: Arc<dyn TagServiceClient>, locks: Arc<GroupLocks>) -> Self {
        Self { tags, locks }
    }

    /// Fold the members of every touched group into `new_member_ids` and
    /// retag the union under its canonical label.
    ///
    /// Expansion is one hop: members of the touched groups are pulled in, but
    /// groups those members also belong to are not followed. Group tags the
    /// new members already hold count as touched. Not atomic; re-running with
    /// the same inputs converges on the same state.
    pub async fn merge(
        &self,
        new_member_ids: &BTreeSet<VideoId>,
        touched_group_labels: &BTreeSet<String>,
    ) -> GroupResult<MergeOutcome> {
        let outcome = self
            .merge_locked(new_member_ids, touched_group_labels)
            .await;
        self.locks.prune();
        outcome
    }

    async fn merge_locked(
        &self,
        new_member_ids: &BTreeSet<VideoId>,
        touched_group_labels: &BTreeSet<String>,
    ) -> GroupResult<MergeOutcome> {
        let (_guards, expansion) = self
            .lock_expansion(new_member_ids, touched_group_labels)
            .await?;

        log::info!(
            "Merging {} candidates with {} group(s) into {} ({} members)",
            new_member_ids.len(),
            expansion.labels.len(),
            expansion.label,
            expansion.accumulator.len()
        );

        let Expansion {
            mut known,
            accumulator,
            label,
            ..
        } = expansion;
        let mut outcome = MergeOutcome::new(label, accumulator);
        let mut stale: BTreeMap<TagId, Tag> = BTreeMap::new();

        let members: Vec<VideoId> = outcome.final_members.iter().copied().collect();
        for video_id in members {
            let video = match known.remove(&video_id) {
                Some(video) => video,
                None => match self.tags.get_video(video_id).await {
                    Ok(video) => video,
                    Err(e) => {
                        log::warn!("Failed to load video {} for merge: {}", video_id, e);
                        outcome.failed += 1;
                        continue;
                    }
                },
            };

            if !self.retag_member(&video, &mut outcome, &mut stale).await {
                outcome.failed += 1;
            }
        }

        self.delete_orphans(stale, &mut outcome).await;

        log::info!(
            "Merged into {}: {} retagged, {} stale label(s) removed, {} deleted, {} failed",
            outcome.label,
            outcome.retagged_ids.len(),
            outcome.removed_labels.len(),
            outcome.deleted_labels.len(),
            outcome.failed
        );
        Ok(outcome)
    }

    /// Acquire the locks of every label the merge touches, including the
    /// final one, which is only known after expansion. Retries with the
    /// larger key set until the expansion seen under the locks needs no more;
    /// the key set only grows between rounds.
    async fn lock_expansion(
        &self,
        new_member_ids: &BTreeSet<VideoId>,
        touched_group_labels: &BTreeSet<String>,
    ) -> GroupResult<(LabelGuards, Expansion)> {
        let mut keys = touched_group_labels.clone();
        let mut rounds = 0usize;

        loop {
            rounds += 1;
            let guards = self.locks.lock_many(&keys).await;
            let expansion = self.expand(new_member_ids, touched_group_labels).await?;

            let missing: Vec<String> = expansion
                .lock_keys()
                .filter(|key| !guards.holds(key))
                .cloned()
                .collect();
            if missing.is_empty() {
                log::debug!("Locked {} label(s) in {} round(s)", keys.len(), rounds);
                return Ok((guards, expansion));
            }

            drop(guards);
            keys.extend(missing);
        }
    }

    async fn expand(
        &self,
        new_member_ids: &BTreeSet<VideoId>,
        touched_group_labels: &BTreeSet<String>,
    ) -> GroupResult<Expansion> {
        let mut known = BTreeMap::new();
        let mut labels = touched_group_labels.clone();

        for &video_id in new_member_ids {
            match self.tags.get_video(video_id).await {
                Ok(video) => {
                    for group in video.group_tags() {
                        labels.insert(group.label().to_string());
                    }
                    known.insert(video_id, video);
                }
                Err(e) => log::warn!("Failed to inspect candidate {}: {}", video_id, e),
            }
        }

        let mut accumulator = new_member_ids.clone();
        for label in &labels {
            let holders = self.tags.find_videos_by_tag(label).await?;
            log::debug!("Group {} currently has {} member(s)", label, holders.len());
            for video in holders {
                accumulator.insert(video.id);
                known.insert(video.id, video);
            }
        }

        let label = GroupIdentity::label(&accumulator);
        Ok(Expansion {
            known,
            accumulator,
            labels,
            label,
        })
    }

    /// Leave `video` with the canonical label as its only group tag. Returns
    /// false when any call for this member failed.
    async fn retag_member(
        &self,
        video: &Video,
        outcome: &mut MergeOutcome,
        stale: &mut BTreeMap<TagId, Tag>,
    ) -> bool {
        let mut complete = true;

        for group in video.group_tags() {
            if group.label() == outcome.label {
                outcome.tag.get_or_insert_with(|| group.tag().clone());
                continue;
            }

            match self.tags.remove_tag_from_video(video.id, group.id()).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    log::debug!("{} already gone from video {}", group, video.id);
                }
                Err(e) => {
                    log::warn!("Failed to remove {} from video {}: {}", group, video.id, e);
                    complete = false;
                    continue;
                }
            }

            let tag = group.into_tag();
            outcome.removed_labels.insert(tag.name.clone());
            outcome.detached.push((video.id, tag.clone()));
            stale.insert(tag.id, tag);
        }

        if !video.has_tag_named(&outcome.label) {
            match self.tags.add_tag_to_video(video.id, &outcome.label).await {
                Ok(tag) => {
                    outcome.retagged_ids.insert(video.id);
                    outcome.tag.get_or_insert(tag);
                }
                Err(e) => {
                    log::warn!(
                        "Failed to tag video {} with {}: {}",
                        video.id,
                        outcome.label,
                        e
                    );
                    complete = false;
                }
            }
        }

        complete
    }

    async fn delete_orphans(&self, stale: BTreeMap<TagId, Tag>, outcome: &mut MergeOutcome) {
        for (tag_id, tag) in stale {
            let remaining = match self.tags.find_videos_by_tag(&tag.name).await {
                Ok(remaining) => remaining,
                Err(e) => {
                    log::warn!("Failed to check remaining members of {}: {}", tag.name, e);
                    continue;
                }
            };
            if !remaining.is_empty() {
                log::debug!(
                    "Keeping {}: still held by {} video(s)",
                    tag.name,
                    remaining.len()
                );
                continue;
            }

            match self.tags.delete_tag(tag_id).await {
                Ok(()) => {
                    log::info!("Deleted orphaned group tag {}", tag.name);
                    outcome.deleted_labels.insert(tag.name);
                }
                Err(e) if e.is_not_found() => {
                    log::info!("Orphaned group tag {} was already deleted", tag.name);
                    outcome.deleted_labels.insert(tag.name);
                }
                Err(e) => log::warn!("Failed to delete orphaned group tag {}: {}", tag.name, e),
            }
        }
    }
}
