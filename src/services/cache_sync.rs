use super::merger::MergeOutcome;
use super::tagger::TagOutcome;
use crate::core::models::{Tag, Video, VideoId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagAction {
    Add,
    Remove,
}

/// Mirrors a committed tag mutation into locally cached video lists.
pub struct CacheSync;

impl CacheSync {
    /// Apply `action` for `tag` to every cached copy of the videos in
    /// `video_ids`, across all `collections`. Returns the number of copies
    /// whose tag set changed.
    pub fn apply(
        video_ids: &BTreeSet<VideoId>,
        tag: &Tag,
        action: TagAction,
        collections: &mut [&mut Vec<Video>],
    ) -> usize {
        let mut changed = 0;
        for collection in collections.iter_mut() {
            for video in collection.iter_mut().filter(|v| video_ids.contains(&v.id)) {
                let did_change = match action {
                    TagAction::Add => video.insert_tag(tag.clone()),
                    TagAction::Remove => video.remove_tag(tag.id),
                };
                if did_change {
                    changed += 1;
                }
            }
        }
        changed
    }
}

/// Owner of every in-memory copy of the video collection.
///
/// The full catalog, the displayed list and the named selections are
/// independent lists that may hold copies of the same video. They are only
/// mutable through [`VideoCollections::apply`], so a tag change always lands
/// in all of them.
#[derive(Debug, Clone, Default)]
pub struct VideoCollections {
    catalog: Vec<Video>,
    displayed: Vec<Video>,
    selections: BTreeMap<String, Vec<Video>>,
}

impl VideoCollections {
    pub fn new(catalog: Vec<Video>) -> Self {
        Self {
            displayed: catalog.clone(),
            catalog,
            selections: BTreeMap::new(),
        }
    }

    pub fn catalog(&self) -> &[Video] {
        &self.catalog
    }

    pub fn displayed(&self) -> &[Video] {
        &self.displayed
    }

    pub fn selection(&self, name: &str) -> Option<&[Video]> {
        self.selections.get(name).map(Vec::as_slice)
    }

    pub fn selection_names(&self) -> impl Iterator<Item = &str> {
        self.selections.keys().map(String::as_str)
    }

    /// Replace the displayed list with the catalog videos matching `filter`.
    pub fn show_where<F>(&mut self, filter: F)
    where
        F: Fn(&Video) -> bool,
    {
        self.displayed = self.catalog.iter().filter(|v| filter(*v)).cloned().collect();
    }

    /// Open (or replace) a transient selection copied from the catalog.
    pub fn select(&mut self, name: impl Into<String>, ids: &BTreeSet<VideoId>) {
        let videos = self
            .catalog
            .iter()
            .filter(|v| ids.contains(&v.id))
            .cloned()
            .collect();
        self.selections.insert(name.into(), videos);
    }

    pub fn close_selection(&mut self, name: &str) -> bool {
        self.selections.remove(name).is_some()
    }

    pub fn apply(&mut self, video_ids: &BTreeSet<VideoId>, tag: &Tag, action: TagAction) -> usize {
        let mut collections: Vec<&mut Vec<Video>> = Vec::with_capacity(2 + self.selections.len());
        collections.push(&mut self.catalog);
        collections.push(&mut self.displayed);
        collections.extend(self.selections.values_mut());

        let changed = CacheSync::apply(video_ids, tag, action, &mut collections);
        log::debug!(
            "{:?} {} on {} video(s): {} cached copies changed",
            action,
            tag.name,
            video_ids.len(),
            changed
        );
        changed
    }

    /// Mirror a tagging result; only the members the service accepted change.
    pub fn apply_tagging(&mut self, outcome: &TagOutcome) -> usize {
        match &outcome.tag {
            Some(tag) => self.apply(&outcome.tagged_ids, tag, TagAction::Add),
            None => 0,
        }
    }

    /// Mirror a merge result: stale labels come off, the canonical label goes on.
    pub fn apply_merge(&mut self, outcome: &MergeOutcome) -> usize {
        let mut changed = 0;
        for (video_id, tag) in &outcome.detached {
            changed += self.apply(&BTreeSet::from([*video_id]), tag, TagAction::Remove);
        }
        if let Some(tag) = &outcome.tag {
            changed += self.apply(&outcome.retagged_ids, tag, TagAction::Add);
        }
        changed
    }
}
