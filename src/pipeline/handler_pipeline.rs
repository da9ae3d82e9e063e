use std::cmp::Reverse;

use super::{classifier::PacketKind, packet_handler::PacketHandler};

/// Ordered set of handlers, at most one per [`PacketKind`].
#[derive(Debug, Default)]
pub struct PacketHandlerPipeline {
    handlers: Vec<PacketHandler>,
}

impl PacketHandlerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `handler`, replacing any handler of the same kind.
    pub fn add_handler(&mut self, handler: PacketHandler) {
        let kind = handler.kind();
        self.handlers.retain(|h| h.kind() != kind);
        self.handlers.push(handler);
        self.handlers.sort_by_key(|h| Reverse(h.priority()));
    }

    pub fn remove_handler(&mut self, kind: PacketKind) -> Option<PacketHandler> {
        let pos = self.handlers.iter().position(|h| h.kind() == kind)?;
        Some(self.handlers.remove(pos))
    }

    /// First handler, by priority, whose predicate accepts `bytes`.
    #[must_use]
    pub fn classify(&self, bytes: &[u8]) -> Option<&PacketHandler> {
        self.handlers.iter().find(|h| h.can_handle(bytes))
    }

    #[must_use]
    pub fn contains(&self, kind: PacketKind) -> bool {
        self.handlers.iter().any(|h| h.kind() == kind)
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<PacketKind> {
        self.handlers.iter().map(PacketHandler::kind).collect()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
