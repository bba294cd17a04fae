//! `action=ping`: liveness check through the full pipeline.

use apigate_kernel::gateway::{ApiModule, ModuleContext, ModuleError};
use serde_json::json;

pub struct PingModule;

impl ApiModule for PingModule {
    fn module_name(&self) -> &str {
        "ping"
    }

    fn execute(&self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        ctx.add_value("ping", json!({ "pong": true }))?;
        Ok(())
    }
}
