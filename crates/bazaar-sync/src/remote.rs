//! # Remote Collaborators
//!
//! The marketplace API client and the connectivity oracle are provided by the
//! host app. The offline layer only sees these traits.
//!
//! ```text
//! MutationQueue ──create / upload_attachment──► RemoteApi ──► HTTPS
//! SyncEngine    ──fetch(resource)─────────────►
//!
//! MutationQueue ──is_online()──► Connectivity ◄── OS reachability callback
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use bazaar_core::{MutationPayload, RemoteId, ResourceItem};

use crate::error::RemoteError;

/// Marketplace API client.
///
/// Implementations carry their own timeouts; the queue never cancels a call.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Replays a mutation and returns the server id of the affected record.
    async fn create(&self, payload: &MutationPayload) -> Result<RemoteId, RemoteError>;

    /// Uploads the binary attachment of a record created by [`Self::create`].
    async fn upload_attachment(&self, remote_id: &RemoteId, bytes: &[u8]) -> Result<(), RemoteError>;

    /// Fetches the full current contents of a resource.
    async fn fetch(&self, resource: &str) -> Result<Vec<ResourceItem>, RemoteError>;
}

/// Reports whether the device can currently reach the network.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag flipped by the host from OS reachability callbacks.
#[derive(Debug)]
pub struct SharedConnectivity {
    online: AtomicBool,
}

impl SharedConnectivity {
    pub fn new(online: bool) -> Self {
        SharedConnectivity {
            online: AtomicBool::new(online),
        }
    }

    /// Stores the new state and returns the previous one.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
