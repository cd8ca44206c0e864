/// A unit of work bound to one input.
///
/// `execute` consumes the task and returns nothing; any effect goes through
/// the collaborators the factory bound into it. Tasks run on a blocking pool
/// thread, inside the runtime context, so they may take std locks and spawn
/// tokio tasks but must not block on async code.
pub trait Task: Send + 'static {
    fn execute(self);
}

/// Builds a task for each input submitted to a
/// [`Processor`](super::Processor).
pub trait TaskFactory: Send + Sync + 'static {
    type Input: Send + 'static;
    type Task: Task;

    fn new_task(&self, input: Self::Input) -> Self::Task;
}
