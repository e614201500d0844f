use super::states::{LastOperationState, OperationKind, TaskState};

/// Outcome of classifying one poll of an operation's deployment task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub state: LastOperationState,
    /// The operation record has been consumed and must be removed from the ledger
    pub clear_record: bool,
}

/// Classify a polled task status for an operation of the given kind.
///
/// This is a pure function of its inputs. Deprovision records are cleared once
/// their task is terminal whichever way it ended: the deployment is gone or was
/// never valid, so there is nothing left to track. Provision records are kept so
/// that binds can keep reading their credentials.
pub fn reconcile(kind: OperationKind, task: &TaskState) -> Reconciliation {
    let state = match task {
        TaskState::Done => LastOperationState::Succeeded,
        TaskState::Error => LastOperationState::Failed,
        TaskState::Running(_) => LastOperationState::InProgress,
    };

    let clear_record = kind == OperationKind::Deprovision && task.is_terminal();

    Reconciliation { state, clear_record }
}
