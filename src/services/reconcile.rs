use super::locks::GroupLocks;
use super::merger::{GroupMerger, MergeOutcome};
use super::tagger::{GroupTagger, TagOutcome};
use crate::clients::{SimilarityClient, TagServiceClient};
use crate::core::identity::GroupIdentity;
use crate::core::models::VideoId;
use crate::error::{GroupError, GroupResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    NoMatches {
        probe: VideoId,
    },
    Tagged {
        outcome: TagOutcome,
        scores: BTreeMap<VideoId, f64>,
    },
    Merged {
        outcome: MergeOutcome,
        scores: BTreeMap<VideoId, f64>,
    },
}

/// What would happen for a probe, computed without writing anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcilePlan {
    pub probe: VideoId,
    pub candidates: BTreeSet<VideoId>,
    pub touched_labels: BTreeSet<String>,
    pub label: String,
    pub scores: BTreeMap<VideoId, f64>,
}

impl ReconcilePlan {
    /// A merge is needed when the candidates touch any group other than their own.
    pub fn needs_merge(&self) -> bool {
        self.touched_labels.iter().any(|l| *l != self.label)
    }
}

/// Runs the whole probe → similarity search → tag or merge flow.
pub struct DuplicateReconciler {
    tags: Arc<dyn TagServiceClient>,
    similarity: Arc<dyn SimilarityClient>,
    tagger: GroupTagger,
    merger: GroupMerger,
    default_threshold: f64,
}

impl DuplicateReconciler {
    pub fn new(
        tags: Arc<dyn TagServiceClient>,
        similarity: Arc<dyn SimilarityClient>,
        default_threshold: f64,
    ) -> Self {
        let locks = Arc::new(GroupLocks::new());
        Self {
            tagger: GroupTagger::new(tags.clone(), locks.clone()),
            merger: GroupMerger::new(tags.clone(), locks),
            tags,
            similarity,
            default_threshold,
        }
    }

    pub fn tagger(&self) -> &GroupTagger {
        &self.tagger
    }

    pub fn merger(&self) -> &GroupMerger {
        &self.merger
    }

    /// Look up matches for `probe` and collect the groups they already touch.
    /// Returns `None` when the similarity service finds nothing.
    pub async fn plan(
        &self,
        probe: VideoId,
        threshold: Option<f64>,
    ) -> GroupResult<Option<ReconcilePlan>> {
        let threshold = threshold.unwrap_or(self.default_threshold);
        let matches = self
            .similarity
            .find_matches(probe, threshold)
            .await
            .map_err(|source| GroupError::Similarity {
                video_id: probe,
                source,
            })?;

        let matches: Vec<_> = matches.into_iter().filter(|m| m.video.id != probe).collect();
        if matches.is_empty() {
            log::info!("No matches for video {} at threshold {}", probe, threshold);
            return Ok(None);
        }

        let probe_video = self.tags.get_video(probe).await?;
        let mut candidates = BTreeSet::from([probe]);
        let mut touched_labels: BTreeSet<String> = probe_video
            .group_tags()
            .iter()
            .map(|g| g.label().to_string())
            .collect();
        let mut scores = BTreeMap::new();

        for found in matches {
            candidates.insert(found.video.id);
            scores.insert(found.video.id, found.similarity_score);
            touched_labels.extend(
                found
                    .video
                    .group_tags()
                    .iter()
                    .map(|g| g.label().to_string()),
            );
        }

        let label = GroupIdentity::label(&candidates);
        log::debug!(
            "Video {}: {} candidate(s), touched groups {:?}",
            probe,
            candidates.len(),
            touched_labels
        );
        Ok(Some(ReconcilePlan {
            probe,
            candidates,
            touched_labels,
            label,
            scores,
        }))
    }

    pub async fn execute(&self, plan: ReconcilePlan) -> GroupResult<ReconcileOutcome> {
        if plan.needs_merge() {
            let outcome = self
                .merger
                .merge(&plan.candidates, &plan.touched_labels)
                .await?;
            Ok(ReconcileOutcome::Merged {
                outcome,
                scores: plan.scores,
            })
        } else {
            let outcome = self.tagger.tag(&plan.candidates).await?;
            Ok(ReconcileOutcome::Tagged {
                outcome,
                scores: plan.scores,
            })
        }
    }

    pub async fn reconcile(
        &self,
        probe: VideoId,
        threshold: Option<f64>,
    ) -> GroupResult<ReconcileOutcome> {
        match self.plan(probe, threshold).await? {
            Some(plan) => self.execute(plan).await,
            None => Ok(ReconcileOutcome::NoMatches { probe }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InMemorySimilarity, InMemoryTagService};
    use crate::services::cache_sync::VideoCollections;

    async fn fixture(ids: &[VideoId]) -> (Arc<InMemoryTagService>, Arc<InMemorySimilarity>) {
        let store = Arc::new(InMemoryTagService::with_videos(ids.iter().copied()));
        let similarity = Arc::new(InMemorySimilarity::new(store.clone()));
        (store, similarity)
    }

    #[tokio::test]
    async fn test_no_matches() {
        let (store, similarity) = fixture(&[1, 2]).await;
        similarity.add_match(1, 2, 0.5).await;
        let reconciler = DuplicateReconciler::new(store.clone(), similarity, 0.85);

        let outcome = reconciler.reconcile(1, None).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoMatches { probe: 1 });
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_fresh_candidates_are_tagged() {
        let (store, similarity) = fixture(&[3, 5, 7]).await;
        similarity.add_match(3, 5, 0.97).await;
        similarity.add_match(3, 7, 0.9).await;
        let reconciler = DuplicateReconciler::new(store.clone(), similarity, 0.85);

        let (outcome, scores) = match reconciler.reconcile(3, None).await.unwrap() {
            ReconcileOutcome::Tagged { outcome, scores } => (outcome, scores),
            other => panic!("expected tagging, got {:?}", other),
        };
        assert_eq!(outcome.label, "dup-3v-2e3f");
        assert_eq!(outcome.tagged, 3);
        assert_eq!(scores.get(&5), Some(&0.97));

        // Running again finds the group already in place.
        match reconciler.reconcile(3, None).await.unwrap() {
            ReconcileOutcome::Tagged { outcome, .. } => assert!(outcome.already_grouped),
            other => panic!("expected tagging, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overlap_triggers_merge_and_cache_update() {
        let (store, similarity) = fixture(&[1, 2, 9]).await;
        store.seed_group("dup-2v-aaaa", &[2, 9]).await;
        similarity.add_match(1, 2, 0.93).await;

        let mut collections = VideoCollections::new(vec![
            store.snapshot(1).await.unwrap(),
            store.snapshot(2).await.unwrap(),
            store.snapshot(9).await.unwrap(),
        ]);
        collections.select("current", &BTreeSet::from([2, 9]));

        let reconciler = DuplicateReconciler::new(store.clone(), similarity, 0.85);
        let plan = reconciler.plan(1, Some(0.9)).await.unwrap().unwrap();
        assert!(plan.needs_merge());
        assert_eq!(plan.touched_labels, BTreeSet::from(["dup-2v-aaaa".to_string()]));

        let outcome = match reconciler.execute(plan).await.unwrap() {
            ReconcileOutcome::Merged { outcome, .. } => outcome,
            other => panic!("expected a merge, got {:?}", other),
        };
        assert_eq!(outcome.label, "dup-3v-2c7b");
        collections.apply_merge(&outcome);

        for video in collections
            .catalog()
            .iter()
            .chain(collections.displayed())
            .chain(collections.selection("current").unwrap())
        {
            let remote = store.snapshot(video.id).await.unwrap();
            assert_eq!(video.tags, remote.tags, "cache for {} diverged", video.id);
        }
    }

    #[tokio::test]
    async fn test_unreachable_tag_service_is_hard_failure() {
        let store = Arc::new(InMemoryTagService::with_videos([1, 2]));
        let similarity = Arc::new(InMemorySimilarity::new(store.clone()));
        similarity.add_match(1, 2, 0.99).await;
        store.set_unavailable(true).await;

        let reconciler = DuplicateReconciler::new(store, similarity, 0.85);
        let err = reconciler.reconcile(1, None).await.unwrap_err();
        assert!(matches!(err, GroupError::TagService(_)));
    }
}
