pub mod cache_sync;
pub mod locks;
pub mod merger;
pub mod reconcile;
pub mod review;
pub mod tagger;

pub use cache_sync::{CacheSync, TagAction, VideoCollections};
pub use locks::GroupLocks;
pub use merger::{GroupMerger, MergeOutcome};
pub use reconcile::{DuplicateReconciler, ReconcileOutcome, ReconcilePlan};
pub use review::{DuplicateReviewSession, ReviewGroup, ReviewMember, ReviewSnapshot};
pub use tagger::{GroupTagger, TagOutcome};
