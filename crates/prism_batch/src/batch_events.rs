/// Notifications a batch run sends to its caller.
///
/// Progress for an item is sent after that item's `SceneProcessed` (if any)
/// and before anything about the next item. A run ends with either
/// `Progress(1.0)` followed by `Completed`, or a single `Error`, or nothing
/// at all when it was cancelled.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchEvent {
    /// Fraction of items attempted, in `[0, 1]`.
    Progress(f32),
    SceneProcessed { name: String },
    Completed,
    Error(String),
}
