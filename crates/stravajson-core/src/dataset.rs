//! Merging and deduplication of activity datasets.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;

use crate::activity::{Activity, ActivityId};

/// An ordered collection of activities, unique by id and sorted newest first.
///
/// Ordering is descending by [`Activity::effective_start_date`]; entries with
/// no date sort last. Entries with equal dates keep their relative order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Dataset {
    activities: Vec<Activity>,
}

impl Dataset {
    /// Returns the number of activities.
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Returns true if the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Returns the activities in dataset order.
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    /// Iterates over the activities in dataset order.
    pub fn iter(&self) -> std::slice::Iter<'_, Activity> {
        self.activities.iter()
    }

    /// Returns the ids in dataset order.
    pub fn ids(&self) -> Vec<ActivityId> {
        self.activities.iter().filter_map(Activity::id).collect()
    }

    /// Consumes the dataset and returns the activities.
    pub fn into_vec(self) -> Vec<Activity> {
        self.activities
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Activity;
    type IntoIter = std::slice::Iter<'a, Activity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Merges a previously saved dataset with freshly fetched activities.
///
/// Entries are keyed by id: `existing` is inserted first, then `fresh`, so a
/// fresh activity replaces an existing one with the same id (keeping the
/// position of the first occurrence). Activities without a usable id are
/// dropped. The result is sorted descending by effective start date.
pub fn merge_dedupe(existing: Option<Vec<Activity>>, fresh: Option<Vec<Activity>>) -> Dataset {
    let mut slots: HashMap<ActivityId, usize> = HashMap::new();
    let mut activities: Vec<Activity> = Vec::new();

    for activity in existing.into_iter().flatten().chain(fresh.into_iter().flatten()) {
        let Some(id) = activity.id() else {
            continue;
        };
        match slots.entry(id) {
            Entry::Occupied(slot) => activities[*slot.get()] = activity,
            Entry::Vacant(slot) => {
                slot.insert(activities.len());
                activities.push(activity);
            }
        }
    }

    activities.sort_by(|a, b| b.effective_start_date().cmp(a.effective_start_date()));

    Dataset { activities }
}
