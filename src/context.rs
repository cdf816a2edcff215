//! Shared handles threaded through the Lifecycle Manager, Snapshot Service,
//! Health Monitor, Metrics Sampler, and API handlers — the same
//! "one `AppState`, cheap to clone" shape the teacher's `todo_backend`
//! examples use for their `Arc<dyn Repo>`-holding state struct.

use crate::config::Config;
use crate::orchestrator::ContainerRuntime;
use crate::persistence::Store;
use crate::vnet::VNetAllocator;
use crate::volume::VolumeService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<Store>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub volumes: Arc<VolumeService>,
    pub vnets: Arc<VNetAllocator>,
    pub config: Arc<Config>,
}
