use std::fmt::Debug;

/// Index of a frame in the buffer pool's frame array.
pub type FrameId = usize;

/// Victim-selection policy over buffer pool frames.
///
/// The pool inserts a frame when its pin count drops to zero and erases it
/// when the frame is pinned again; only tracked frames may be returned by
/// [`Replacer::victim`].
pub trait Replacer: Send + Sync + Debug {
    /// Track `frame_id` as evictable. Re-inserting an already tracked frame
    /// refreshes its recency.
    fn insert(&self, frame_id: FrameId);

    /// Select a frame to evict and stop tracking it. Returns `None` if no
    /// frame is evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Stop tracking `frame_id`, reporting whether it was tracked.
    fn erase(&self, frame_id: FrameId) -> bool;

    /// Number of evictable frames.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
