pub mod identity;
pub mod models;

pub use identity::{GROUP_LABEL_PREFIX, GroupIdentity, is_group_label};
pub use models::{GroupTag, NotAGroupTag, SimilarMatch, Tag, TagId, Video, VideoId};
