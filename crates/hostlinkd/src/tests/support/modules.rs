//! Handler modules whose contents scenarios can change between reloads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};

use crate::registry::{HandlerBinding, HandlerError, HandlerModule, ModuleError};

/// Module that serves `host.version` and, once switched on, `host.extra`.
#[derive(Debug, Clone, Default)]
pub struct SwitchableModule {
    extra: Arc<AtomicBool>,
}

impl SwitchableModule {
    /// Makes the next load include `host.extra`.
    pub fn enable_extra(&self) {
        self.extra.store(true, Ordering::SeqCst);
    }
}

impl HandlerModule for SwitchableModule {
    fn name(&self) -> &str {
        "host"
    }

    fn load(&self) -> Result<Vec<HandlerBinding>, ModuleError> {
        let mut bindings = vec![HandlerBinding::host(
            "host.version",
            |_params: Value| -> Result<Value, HandlerError> { Ok(json!("1.0")) },
        )];
        if self.extra.load(Ordering::SeqCst) {
            bindings.push(HandlerBinding::any(
                "host.extra",
                |_params: Value| -> Result<Value, HandlerError> { Ok(json!({"extra": true})) },
            ));
        }
        Ok(bindings)
    }
}
