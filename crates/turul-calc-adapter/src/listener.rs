//! Connection lifecycle notifications.

use crate::handle::HandleId;
use crate::managed::ResourceId;

/// Emitted when a handle leaves a resource, whether closed by its client, dropped
/// during cleanup, or moved to another resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub resource_id: ResourceId,
    pub handle_id: HandleId,
}

/// Observer of a managed calculator's connection events.
pub trait ConnectionEventListener: Send + Sync {
    fn connection_closed(&self, event: &ConnectionEvent);
}
