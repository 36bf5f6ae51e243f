use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::host::ElementId;
use crate::idle::{HookStatus, IdleHandle, IdleHook, IdleScope};

pub const KEEPER_DELETE_TRANSACTION: &str = "Delete preview keeper";

/// Shared slot holding the transient preview element created by
/// visualization collaborators.
#[derive(Debug, Clone, Default)]
pub struct KeeperSlot {
    element: Arc<Mutex<Option<ElementId>>>,
}

impl KeeperSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: ElementId) {
        *self.lock() = Some(id);
    }

    pub fn get(&self) -> Option<ElementId> {
        *self.lock()
    }

    pub fn take(&self) -> Option<ElementId> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ElementId>> {
        self.element.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deletes the keeper element on the first idle event, then unsubscribes.
pub struct KeeperCleanupHook {
    slot: KeeperSlot,
}

impl KeeperCleanupHook {
    pub fn new(slot: KeeperSlot) -> Self {
        Self { slot }
    }
}

impl IdleHook for KeeperCleanupHook {
    fn on_idle(&mut self, scope: &mut IdleScope<'_>) -> HookStatus {
        let Some(id) = self.slot.take() else {
            tracing::debug!("no preview keeper to delete");
            return HookStatus::Unsubscribe;
        };

        match scope.transaction(KEEPER_DELETE_TRANSACTION, |document| document.delete_element(id)) {
            Ok(()) => tracing::debug!(element = %id, "deleted preview keeper"),
            Err(err) => tracing::error!(
                element = %id,
                error = %format!("{err:#}"),
                "failed to delete preview keeper"
            ),
        }
        HookStatus::Unsubscribe
    }
}

/// Handler the payload model calls when its shutdown starts. Only the first
/// call registers the keeper cleanup hook.
#[derive(Clone)]
pub struct ShutdownStartedHandler {
    idle: IdleHandle,
    keeper: KeeperSlot,
    armed: Arc<AtomicBool>,
}

impl ShutdownStartedHandler {
    pub fn new(idle: IdleHandle, keeper: KeeperSlot) -> Self {
        Self {
            idle,
            keeper,
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns `true` when this call registered the cleanup hook.
    pub fn shutdown_started(&self) -> Result<bool> {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        self.idle
            .register_idle_hook(KeeperCleanupHook::new(self.keeper.clone()))?;
        Ok(true)
    }
}
