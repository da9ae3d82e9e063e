/// A socket owner driven by the multiplexer. All calls come from one poll
/// thread and must not block.
pub trait PollOwner: Send + Sync {
    /// Drains the socket until it would block.
    fn receive(&self);
    fn has_pending_output(&self) -> bool;
    /// Flushes queued datagrams until the socket would block.
    fn send(&self);
    fn is_closed(&self) -> bool;
}
