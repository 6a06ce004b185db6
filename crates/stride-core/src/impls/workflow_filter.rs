//! Completion hook for tasks that belong to an external workflow.

use async_trait::async_trait;

use crate::domain::TaskEvent;
use crate::ports::{EventSink, EventSinkError};

/// Forwards `Completed` events of tasks whose metadata carries a
/// `"workflow"` key. Everything else is dropped.
pub struct WorkflowFilter<S> {
    inner: S,
}

impl<S: EventSink> WorkflowFilter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: EventSink> EventSink for WorkflowFilter<S> {
    async fn emit(&self, event: &TaskEvent) -> Result<(), EventSinkError> {
        let TaskEvent::Completed { task } = event else {
            return Ok(());
        };
        if task.workflow_ref().is_none() {
            return Ok(());
        }
        self.inner.emit(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSink, sample_task};

    #[tokio::test]
    async fn forwards_only_workflow_completions() {
        let (sink, mut events) = RecordingSink::new();
        let filter = WorkflowFilter::new(sink);

        let plain = sample_task(1);
        let mut workflow = sample_task(1);
        workflow.metadata = Some(serde_json::json!({ "workflow": "wf-1" }));

        filter.emit(&TaskEvent::Completed { task: plain }).await.unwrap();
        filter
            .emit(&TaskEvent::Failed {
                task: workflow.clone(),
                error: "boom".to_string(),
            })
            .await
            .unwrap();
        filter
            .emit(&TaskEvent::Completed {
                task: workflow.clone(),
            })
            .await
            .unwrap();

        let forwarded = events.try_recv().unwrap();
        assert_eq!(forwarded.task().id, workflow.id);
        assert_eq!(forwarded.kind(), "completed");
        assert!(events.try_recv().is_err());
    }
}
