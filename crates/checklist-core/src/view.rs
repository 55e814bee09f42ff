use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Latest,
    Oldest,
    CompletedFirst,
    UncompletedFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    All,
    Active,
    Completed,
}

impl SortMode {
    pub const ALL: [SortMode; 4] = [
        SortMode::Latest,
        SortMode::Oldest,
        SortMode::CompletedFirst,
        SortMode::UncompletedFirst,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Latest => "latest",
            SortMode::Oldest => "oldest",
            SortMode::CompletedFirst => "completed_first",
            SortMode::UncompletedFirst => "uncompleted_first",
        }
    }

    fn compare(self, a: &Task, b: &Task) -> Ordering {
        match self {
            SortMode::Latest => b.id.cmp(&a.id),
            SortMode::Oldest => a.id.cmp(&b.id),
            // `true > false`, so reversing puts completed tasks first.
            SortMode::CompletedFirst => b.completed.cmp(&a.completed),
            SortMode::UncompletedFirst => a.completed.cmp(&b.completed),
        }
    }
}

impl FilterMode {
    pub const ALL: [FilterMode; 3] = [FilterMode::All, FilterMode::Active, FilterMode::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::All => "all",
            FilterMode::Active => "active",
            FilterMode::Completed => "completed",
        }
    }

    pub fn matches(self, task: &Task) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Active => !task.completed,
            FilterMode::Completed => task.completed,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_mode(s);
        SortMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == key)
            .ok_or_else(|| {
                anyhow!(
                    "unknown sort mode: {s} (expected latest, oldest, completed_first or uncompleted_first)"
                )
            })
    }
}

impl FromStr for FilterMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_mode(s);
        FilterMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == key)
            .ok_or_else(|| anyhow!("unknown filter mode: {s} (expected all, active or completed)"))
    }
}

fn normalize_mode(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace('-', "_")
}

/// One row of the derived view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleTask {
    pub id: crate::task::TaskId,
    pub text: String,
    pub completed: bool,
    pub selected: bool,
}

/// Sorts a copy of `tasks` and then applies `filter`. The input slice is
/// never reordered.
///
/// `slice::sort_by` is stable, so the two completion-based modes keep stored
/// order inside each group.
pub fn derive<'a>(tasks: &'a [Task], sort: SortMode, filter: FilterMode) -> Vec<&'a Task> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| sort.compare(a, b));

    let visible: Vec<&Task> = sorted
        .into_iter()
        .filter(|task| filter.matches(task))
        .collect();

    trace!(
        total = tasks.len(),
        visible = visible.len(),
        %sort,
        %filter,
        "derived view"
    );
    visible
}
