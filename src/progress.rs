//! Progress observation hooks.
//!
//! The engine does not render anything. Callers that want a progress bar or a
//! status line implement [`ProgressCallback`] and attach it to the finder.
//! All callbacks are invoked from the scan's fan-in stage, one at a time,
//! never concurrently from worker threads.

/// Name of the partial-tier pass.
pub const PHASE_PARTIAL: &str = "partial";

/// Name of the full-tier pass.
pub const PHASE_FULL: &str = "full";

/// Progress callback for the hashing passes.
pub trait ProgressCallback: Send + Sync {
    /// Called when a pass starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - [`PHASE_PARTIAL`] or [`PHASE_FULL`]
    /// * `total` - Number of items, or 0 when the total is not known up front
    ///   (the partial pass streams from the walker)
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each completed item.
    ///
    /// # Arguments
    ///
    /// * `current` - Completed item count so far (1-based)
    /// * `path` - Path of the completed item
    fn on_progress(&self, current: usize, path: &str);

    /// Called with the size of each successfully hashed item.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a pass completes (or is cut short by cancellation).
    fn on_phase_end(&self, phase: &str);

    /// Free-form status message.
    fn on_message(&self, _message: &str) {}
}
