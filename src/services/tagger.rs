use super::locks::GroupLocks;
use crate::clients::TagServiceClient;
use crate::core::identity::GroupIdentity;
use crate::core::models::{Tag, VideoId};
use crate::error::GroupResult;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result of tagging one candidate set. Counts are best-effort: a partially
/// tagged set is a normal outcome the caller surfaces, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagOutcome {
    pub label: String,
    pub tagged: usize,
    pub failed: usize,
    /// The group tag as the service returned it, when at least one write succeeded.
    pub tag: Option<Tag>,
    /// Members that now hold the tag and need it mirrored into local caches.
    pub tagged_ids: BTreeSet<VideoId>,
    pub already_grouped: bool,
}

impl TagOutcome {
    fn empty(label: String, already_grouped: bool) -> Self {
        Self {
            label,
            tagged: 0,
            failed: 0,
            tag: None,
            tagged_ids: BTreeSet::new(),
            already_grouped,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

pub struct GroupTagger {
    tags: Arc<dyn TagServiceClient>,
    locks: Arc<GroupLocks>,
}

impl GroupTagger {
    pub fn new(tags: Arc<dyn TagServiceClient>, locks: Arc<GroupLocks>) -> Self {
        Self { tags, locks }
    }

    /// Tag every member with the set's canonical label, unless some member
    /// already carries it.
    ///
    /// Members are processed one at a time; a failed write is counted and the
    /// remaining members are still attempted.
    pub async fn tag(&self, member_ids: &BTreeSet<VideoId>) -> GroupResult<TagOutcome> {
        let label = GroupIdentity::label(member_ids);
        if member_ids.is_empty() {
            return Ok(TagOutcome::empty(label, false));
        }

        let outcome = {
            let _guard = self.locks.lock(&label).await;
            self.tag_locked(member_ids, label).await
        };
        self.locks.prune();
        outcome
    }

    async fn tag_locked(
        &self,
        member_ids: &BTreeSet<VideoId>,
        label: String,
    ) -> GroupResult<TagOutcome> {
        let holders = self.tags.find_videos_by_tag(&label).await?;
        if let Some(holder) = holders.iter().find(|v| member_ids.contains(&v.id)) {
            log::info!(
                "Group {} already present on video {}, skipping",
                label,
                holder.id
            );
            return Ok(TagOutcome::empty(label, true));
        }

        let mut outcome = TagOutcome::empty(label, false);
        for &video_id in member_ids {
            match self.tags.add_tag_to_video(video_id, &outcome.label).await {
                Ok(tag) => {
                    outcome.tagged += 1;
                    outcome.tagged_ids.insert(video_id);
                    outcome.tag.get_or_insert(tag);
                }
                Err(e) => {
                    log::warn!(
                        "Failed to tag video {} with {}: {}",
                        video_id,
                        outcome.label,
                        e
                    );
                    outcome.failed += 1;
                }
            }
        }

        log::info!(
            "Tagged {} of {} videos with {} ({} failed)",
            outcome.tagged,
            member_ids.len(),
            outcome.label,
            outcome.failed
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::InMemoryTagService;
    use crate::error::GroupError;

    fn ids(values: &[VideoId]) -> BTreeSet<VideoId> {
        values.iter().copied().collect()
    }

    fn tagger(store: &Arc<InMemoryTagService>) -> GroupTagger {
        GroupTagger::new(store.clone(), Arc::new(GroupLocks::new()))
    }

    #[tokio::test]
    async fn test_tag_all_members() {
        let store = Arc::new(InMemoryTagService::with_videos([3, 5, 7]));
        let outcome = tagger(&store).tag(&ids(&[7, 3, 5])).await.unwrap();

        assert_eq!(outcome.label, "dup-3v-2e3f");
        assert_eq!(outcome.tagged, 3);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.tagged_ids, ids(&[3, 5, 7]));
        assert_eq!(outcome.tag.as_ref().map(|t| t.name.as_str()), Some("dup-3v-2e3f"));

        for id in [3, 5, 7] {
            assert!(store.snapshot(id).await.unwrap().has_tag_named("dup-3v-2e3f"));
        }
    }

    #[tokio::test]
    async fn test_second_run_performs_no_writes() {
        let store = Arc::new(InMemoryTagService::with_videos([3, 5, 7]));
        let tagger = tagger(&store);

        tagger.tag(&ids(&[3, 5, 7])).await.unwrap();
        let writes = store.write_count().await;
        assert_eq!(writes, 3);

        let again = tagger.tag(&ids(&[3, 5, 7])).await.unwrap();
        assert!(again.already_grouped);
        assert_eq!(again.tagged, 0);
        assert_eq!(store.write_count().await, writes);
        assert_eq!(store.list_tags().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_then_short_circuit() {
        let store = Arc::new(InMemoryTagService::with_videos([1, 2, 3, 4, 5]));
        store.fail_writes_for(4).await;
        let tagger = tagger(&store);
        let members = ids(&[1, 2, 3, 4, 5]);

        let outcome = tagger.tag(&members).await.unwrap();
        assert_eq!(outcome.tagged, 4);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.is_partial());
        assert!(!outcome.tagged_ids.contains(&4));
        assert!(store.snapshot(4).await.unwrap().tags.is_empty());

        store.clear_failures().await;
        let writes = store.write_count().await;
        let again = tagger.tag(&members).await.unwrap();
        assert!(again.already_grouped);
        assert_eq!(store.write_count().await, writes);
    }

    #[tokio::test]
    async fn test_unknown_member_counts_as_failure() {
        let store = Arc::new(InMemoryTagService::with_videos([1, 2]));
        let outcome = tagger(&store).tag(&ids(&[1, 2, 99])).await.unwrap();
        assert_eq!(outcome.tagged, 2);
        assert_eq!(outcome.failed, 1);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_hard_failure() {
        let store = Arc::new(InMemoryTagService::with_videos([1, 2]));
        store.set_unavailable(true).await;
        let result = tagger(&store).tag(&ids(&[1, 2])).await;
        assert!(matches!(result, Err(GroupError::TagService(_))));
    }

    #[tokio::test]
    async fn test_empty_set_makes_no_calls() {
        let store = Arc::new(InMemoryTagService::with_videos([1]));
        let outcome = tagger(&store).tag(&BTreeSet::new()).await.unwrap();
        assert_eq!(outcome.label, "dup-0v-0");
        assert_eq!(outcome.tagged, 0);
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_tag_once() {
        let store = Arc::new(InMemoryTagService::with_videos([10, 11, 12]));
        let tagger = Arc::new(tagger(&store));
        let members = ids(&[10, 11, 12]);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let tagger = tagger.clone();
            let members = members.clone();
            tasks.push(tokio::spawn(async move { tagger.tag(&members).await.unwrap() }));
        }

        let mut total_tagged = 0;
        for task in tasks {
            total_tagged += task.await.unwrap().tagged;
        }

        assert_eq!(total_tagged, 3);
        assert_eq!(store.write_count().await, 3);
        assert_eq!(store.list_tags().await.unwrap().len(), 1);
    }
}
