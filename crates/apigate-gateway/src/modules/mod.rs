//! Built-in API modules.

pub mod ping;
pub mod siteinfo;

pub use ping::PingModule;
pub use siteinfo::{SiteInfo, SiteInfoModule};

use crate::dispatch::ModuleRegistry;
use apigate_kernel::gateway::RegistryError;
use std::sync::Arc;

/// Register `ping` and `siteinfo`.
pub fn register_builtin(
    registry: &mut ModuleRegistry,
    site: Arc<SiteInfo>,
) -> Result<(), RegistryError> {
    registry.register("ping", || Box::new(PingModule))?;
    registry.register("siteinfo", move || Box::new(SiteInfoModule::new(site.clone())))?;
    Ok(())
}
