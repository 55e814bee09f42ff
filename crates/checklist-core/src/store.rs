use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::task::{Task, TaskId};
use crate::view::{self, FilterMode, SortMode, VisibleTask};

const CONFIRM_SINGLE: &str = "Are you sure you want to delete this todo?";
const CONFIRM_BULK: &str = "Are you sure you want to delete selected todos?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteTarget {
    Task(TaskId),
    Selected,
}

/// Confirmation state guarding destructive commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingDeletion {
    #[default]
    Idle,
    Single(TaskId),
    Bulk,
}

impl PendingDeletion {
    pub fn is_pending(self) -> bool {
        !matches!(self, PendingDeletion::Idle)
    }

    pub fn message(self) -> Option<&'static str> {
        match self {
            PendingDeletion::Idle => None,
            PendingDeletion::Single(_) => Some(CONFIRM_SINGLE),
            PendingDeletion::Bulk => Some(CONFIRM_BULK),
        }
    }
}

/// A store command as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "arg", rename_all = "snake_case")]
pub enum Intent {
    Add(String),
    ToggleComplete(TaskId),
    SetSort(SortMode),
    SetFilter(FilterMode),
    ToggleSelect(TaskId),
    RequestDelete(DeleteTarget),
    ConfirmDelete,
    CancelDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Added(TaskId),
    Toggled { id: TaskId, completed: bool },
    Selected { id: TaskId, selected: bool },
    SortChanged(SortMode),
    FilterChanged(FilterMode),
    ConfirmationRequested(PendingDeletion),
    Deleted(Vec<Task>),
    Cancelled,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Store {
    tasks: Vec<Task>,
    selected: BTreeSet<TaskId>,
    sort: SortMode,
    filter: FilterMode,
    pending: PendingDeletion,
    next_id: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(SortMode::default(), FilterMode::default())
    }
}

impl Store {
    pub fn new(sort: SortMode, filter: FilterMode) -> Self {
        Self {
            tasks: Vec::new(),
            selected: BTreeSet::new(),
            sort,
            filter,
            pending: PendingDeletion::Idle,
            next_id: 1,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.task(id).is_some()
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter
    }

    pub fn selected_ids(&self) -> &BTreeSet<TaskId> {
        &self.selected
    }

    pub fn is_selected(&self, id: TaskId) -> bool {
        self.selected.contains(&id)
    }

    pub fn selection_len(&self) -> usize {
        self.selected.len()
    }

    pub fn has_selection(&self) -> bool {
        !self.selected.is_empty()
    }

    pub fn pending_deletion(&self) -> PendingDeletion {
        self.pending
    }

    pub fn confirmation_message(&self) -> Option<&'static str> {
        self.pending.message()
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn add(&mut self, text: &str) -> Option<TaskId> {
        let id = TaskId(self.next_id);
        let Some(task) = Task::new_open(id, text) else {
            debug!("ignoring empty task text");
            return None;
        };

        self.next_id += 1;
        self.tasks.push(task);
        info!(%id, count = self.tasks.len(), "task added");
        Some(id)
    }

    /// Flips the completion flag and returns the new value.
    #[instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: TaskId) -> Option<bool> {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            debug!("toggle on unknown task ignored");
            return None;
        };

        task.completed = !task.completed;
        debug!(completed = task.completed, "task toggled");
        Some(task.completed)
    }

    #[instrument(skip(self))]
    pub fn set_sort(&mut self, mode: SortMode) {
        self.sort = mode;
    }

    #[instrument(skip(self))]
    pub fn set_filter(&mut self, mode: FilterMode) {
        self.filter = mode;
    }

    /// Returns whether `id` is selected afterwards.
    #[instrument(skip(self))]
    pub fn toggle_select(&mut self, id: TaskId) -> Option<bool> {
        if !self.contains(id) {
            debug!("select on unknown task ignored");
            return None;
        }

        let selected = if self.selected.remove(&id) {
            false
        } else {
            self.selected.insert(id);
            true
        };
        debug!(selected, total = self.selected.len(), "selection toggled");
        Some(selected)
    }

    /// Records what the next `confirm_delete` will remove. Returns `None`,
    /// leaving any earlier request in place, when the task does not exist.
    #[instrument(skip(self))]
    pub fn request_delete(&mut self, target: DeleteTarget) -> Option<PendingDeletion> {
        let next = match target {
            DeleteTarget::Task(id) if self.contains(id) => PendingDeletion::Single(id),
            DeleteTarget::Task(_) => {
                debug!("delete request for unknown task ignored");
                return None;
            }
            DeleteTarget::Selected => PendingDeletion::Bulk,
        };

        if self.pending.is_pending() && self.pending != next {
            debug!(previous = ?self.pending, "replacing pending deletion");
        }
        self.pending = next;
        Some(next)
    }

    #[instrument(skip(self))]
    pub fn confirm_delete(&mut self) -> Vec<Task> {
        let pending = std::mem::take(&mut self.pending);

        let removed = match pending {
            PendingDeletion::Idle => {
                debug!("confirm without a pending deletion");
                Vec::new()
            }
            PendingDeletion::Single(id) => {
                self.selected.remove(&id);
                self.remove_where(|task| task.id == id)
            }
            PendingDeletion::Bulk => {
                let selected = std::mem::take(&mut self.selected);
                self.remove_where(|task| selected.contains(&task.id))
            }
        };

        info!(
            removed = removed.len(),
            remaining = self.tasks.len(),
            "deletion confirmed"
        );
        removed
    }

    #[instrument(skip(self))]
    pub fn cancel_delete(&mut self) {
        if self.pending.is_pending() {
            debug!(pending = ?self.pending, "deletion cancelled");
        }
        self.pending = PendingDeletion::Idle;
    }

    /// Sorted, then filtered, view of the stored tasks.
    pub fn visible_tasks(&self) -> Vec<VisibleTask> {
        view::derive(&self.tasks, self.sort, self.filter)
            .into_iter()
            .map(|task| VisibleTask {
                id: task.id,
                text: task.text.clone(),
                completed: task.completed,
                selected: self.selected.contains(&task.id),
            })
            .collect()
    }

    #[instrument(skip(self))]
    pub fn dispatch(&mut self, intent: Intent) -> Outcome {
        match intent {
            Intent::Add(text) => self.add(&text).map_or(Outcome::Ignored, Outcome::Added),
            Intent::ToggleComplete(id) => self
                .toggle_complete(id)
                .map_or(Outcome::Ignored, |completed| Outcome::Toggled { id, completed }),
            Intent::SetSort(mode) => {
                self.set_sort(mode);
                Outcome::SortChanged(mode)
            }
            Intent::SetFilter(mode) => {
                self.set_filter(mode);
                Outcome::FilterChanged(mode)
            }
            Intent::ToggleSelect(id) => self
                .toggle_select(id)
                .map_or(Outcome::Ignored, |selected| Outcome::Selected { id, selected }),
            Intent::RequestDelete(target) => self
                .request_delete(target)
                .map_or(Outcome::Ignored, Outcome::ConfirmationRequested),
            Intent::ConfirmDelete => Outcome::Deleted(self.confirm_delete()),
            Intent::CancelDelete => {
                self.cancel_delete();
                Outcome::Cancelled
            }
        }
    }

    fn remove_where<F>(&mut self, mut doomed: F) -> Vec<Task>
    where
        F: FnMut(&Task) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.tasks.len());
        for task in self.tasks.drain(..) {
            if doomed(&task) {
                removed.push(task);
            } else {
                kept.push(task);
            }
        }
        self.tasks = kept;
        removed
    }
}
