use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};

use crate::serde_helpers::double_option;
use crate::types::{ConversationId, Delegation, SubtaskSummary, Task, TaskId, TaskStatus};

/// A partial task as carried by a `task_update` event.
///
/// Every field except the id is optional: a present field overwrites the
/// stored value, an absent one leaves it alone. For the nullable fields an
/// explicit `null` clears the stored value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskPatch {
    #[serde(alias = "task_id")]
    pub id: TaskId,
    #[serde(default, alias = "agent", deserialize_with = "double_option")]
    pub assigned_agent: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub delegations: Option<Vec<Delegation>>,
    #[serde(default)]
    pub subtasks: Option<Vec<SubtaskSummary>>,
    #[serde(default, deserialize_with = "double_option")]
    pub result: Option<Option<String>>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub completed_at: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskPatch {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            assigned_agent: None,
            status: None,
            description: None,
            delegations: None,
            subtasks: None,
            result: None,
            conversation_id: None,
            parent_task_id: None,
            created_at: None,
            completed_at: None,
            extra: Map::new(),
        }
    }

    /// Shallow merge: overwrite every field the patch carries.
    pub fn apply_to(self, task: &mut Task) {
        if let Some(agent) = self.assigned_agent {
            task.assigned_agent = agent;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(delegations) = self.delegations {
            task.delegations = delegations;
        }
        if let Some(subtasks) = self.subtasks {
            task.subtasks = subtasks;
        }
        if let Some(result) = self.result {
            task.result = result;
        }
        if let Some(conversation_id) = self.conversation_id {
            task.conversation_id = Some(conversation_id);
        }
        if let Some(parent) = self.parent_task_id {
            task.parent_task_id = Some(parent);
        }
        if let Some(created_at) = self.created_at {
            task.created_at = Some(created_at);
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        task.extra.extend(self.extra);
    }

    pub fn into_task(self) -> Task {
        let mut task = Task::new(self.id);
        self.apply_to(&mut task);
        task
    }
}

/// A full task (e.g. from the task detail API) overwrites every field.
impl From<Task> for TaskPatch {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            assigned_agent: Some(task.assigned_agent),
            status: Some(task.status),
            description: Some(task.description),
            delegations: Some(task.delegations),
            subtasks: Some(task.subtasks),
            result: Some(task.result),
            conversation_id: task.conversation_id,
            parent_task_id: task.parent_task_id,
            created_at: task.created_at,
            completed_at: Some(task.completed_at),
            extra: task.extra,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Merged,
}

/// Tasks keyed by id, ordered newest first (new ids are prepended).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskBoard {
    tasks: HashMap<TaskId, Task>,
    order: VecDeque<TaskId>,
}

impl TaskBoard {
    pub fn upsert(&mut self, patch: TaskPatch) -> Upsert {
        match self.tasks.get_mut(&patch.id) {
            Some(task) => {
                patch.apply_to(task);
                Upsert::Merged
            }
            None => {
                let id = patch.id;
                self.tasks.insert(id, patch.into_task());
                self.order.push_front(id);
                Upsert::Inserted
            }
        }
    }

    /// Merge a page of tasks listed newest first, keeping that order for the
    /// ones not yet on the board.
    pub fn seed(&mut self, tasks: Vec<Task>) {
        for task in tasks.into_iter().rev() {
            self.upsert(TaskPatch::from(task));
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Tasks newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
