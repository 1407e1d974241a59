use crate::tracker::ExecutionTracker;

#[derive(Clone)]
pub struct AppState {
    pub tracker: ExecutionTracker,
}
