//! Task parameter types and the public task-kind taxonomy.

use std::any::Any;
use std::fmt;

/// Parameters used when creating a task.
///
/// Most call sites pass a bare name; tasks that need an opaque user payload
/// attach it here and read it back through the task handle.
#[derive(Default)]
pub struct TaskParams {
    /// Human-readable task label.
    pub name: String,
    /// Opaque user payload carried by the node.
    pub data: Option<Box<dyn Any + Send>>,
}

impl TaskParams {
    /// Creates named parameters without a payload.
    pub fn named(name: impl Into<String>) -> Self {
        TaskParams {
            name: name.into(),
            data: None,
        }
    }

    /// Attaches an opaque payload.
    #[must_use]
    pub fn with_data(mut self, data: Box<dyn Any + Send>) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Debug for TaskParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskParams")
            .field("name", &self.name)
            .field("data", &self.data.as_ref().map(|_| "<opaque>"))
            .finish()
    }
}

/// Conversion accepted by every task-creating call: a bare name, full
/// [`TaskParams`], or `()` for a nameless task.
pub trait IntoTaskParams {
    /// Converts into [`TaskParams`].
    fn into_task_params(self) -> TaskParams;
}

impl IntoTaskParams for TaskParams {
    fn into_task_params(self) -> TaskParams {
        self
    }
}

impl IntoTaskParams for () {
    fn into_task_params(self) -> TaskParams {
        TaskParams::default()
    }
}

impl IntoTaskParams for &str {
    fn into_task_params(self) -> TaskParams {
        TaskParams::named(self)
    }
}

impl IntoTaskParams for String {
    fn into_task_params(self) -> TaskParams {
        TaskParams::named(self)
    }
}

/// The kind of work a task vertex carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Pure dependency vertex with no body.
    Placeholder,
    /// Sequential work item.
    Static,
    /// Task that builds and splices a nested graph at run time.
    Subflow,
    /// Task selecting exactly one successor to release.
    Condition,
    /// Task selecting a set of successors to release.
    MultiCondition,
    /// Task executing an externally owned graph under itself.
    Module,
    /// Fire-and-forget asynchronous task.
    Async,
    /// Asynchronous task other async tasks can depend on.
    DependentAsync,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Placeholder => "placeholder",
            TaskType::Static => "static",
            TaskType::Subflow => "subflow",
            TaskType::Condition => "condition",
            TaskType::MultiCondition => "multi_condition",
            TaskType::Module => "module",
            TaskType::Async => "async",
            TaskType::DependentAsync => "dependent_async",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_from_name() {
        let p = "A".into_task_params();
        assert_eq!(p.name, "A");
        assert!(p.data.is_none());

        let p = String::from("B").into_task_params();
        assert_eq!(p.name, "B");

        let p = ().into_task_params();
        assert!(p.name.is_empty());
    }

    #[test]
    fn params_with_data() {
        let p = TaskParams::named("C").with_data(Box::new(7_i64));
        let data = p.data.expect("payload attached");
        assert_eq!(*data.downcast_ref::<i64>().unwrap(), 7);
    }

    #[test]
    fn task_type_display() {
        assert_eq!(TaskType::MultiCondition.to_string(), "multi_condition");
        assert_eq!(TaskType::DependentAsync.to_string(), "dependent_async");
    }
}
