use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::Activity;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 500;

/// Whether an upsert created a new row or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Filters for activity listings. Results are ordered by start date, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityFilter {
    pub sport_type: Option<String>,
    /// Inclusive lower bound on the start date.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the start date.
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the name.
    pub search: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for ActivityFilter {
    fn default() -> Self {
        Self {
            sport_type: None,
            from: None,
            to: None,
            search: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl ActivityFilter {
    /// A filter that returns everything, used by map and statistics reads.
    pub fn all() -> Self {
        Self {
            limit: MAX_LIMIT,
            ..Self::default()
        }
    }

    /// Clamps the page size to `1..=MAX_LIMIT`.
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_LIMIT);
        self
    }

    pub fn matches(&self, activity: &Activity) -> bool {
        if let Some(sport) = &self.sport_type {
            if !activity.sport_type.eq_ignore_ascii_case(sport) {
                return false;
            }
        }
        if self.from.is_some_and(|from| activity.start_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| activity.start_date >= to) {
            return false;
        }
        if let Some(search) = &self.search {
            if !activity
                .name
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// One page of a listing plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPage<T = Activity> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> ActivityPage<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ActivityPage<U> {
        ActivityPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Applies a filter to an in-memory list: match, sort newest first, paginate.
pub fn apply_filter<'a, I>(activities: I, filter: &ActivityFilter) -> ActivityPage
where
    I: IntoIterator<Item = &'a Activity>,
{
    let filter = filter.clone().normalized();
    let mut matching: Vec<&Activity> = activities
        .into_iter()
        .filter(|a| filter.matches(a))
        .collect();
    matching.sort_by(|a, b| b.start_date.cmp(&a.start_date));

    let total = matching.len() as u64;
    let items = matching
        .into_iter()
        .skip(filter.offset as usize)
        .take(filter.limit as usize)
        .cloned()
        .collect();

    ActivityPage {
        items,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }
}
