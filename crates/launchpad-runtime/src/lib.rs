mod dispatch;
mod host;
mod idle;
mod keeper;
mod search_path;
mod session;
mod transaction;

pub use dispatch::{
    Dispatcher, DylibLoader, EntryPoint, LoadedPayload, ModuleLoader, ENTRY_ABI_VERSION,
};
pub use host::{
    ElementId, FallbackSink, HostApplication, HostDocument, HostUi, Instrumentation,
    StabilityTracker, StartupContext, TracingFallbackSink, UiEvent, JOURNAL_DEBUG_KEY,
    JOURNAL_WORKSPACE_KEY,
};
pub use idle::{
    CompletionCallback, HookStatus, IdleHandle, IdleHook, IdlePassReport, IdleScheduler,
    IdleScope, IdleWork, TaskId, TaskOutcome, TaskState,
};
pub use keeper::{
    KeeperCleanupHook, KeeperSlot, ShutdownStartedHandler, KEEPER_DELETE_TRANSACTION,
};
pub use search_path::{
    append_library_search_path, appended_search_dir, joined_search_path, library_search_var,
};
pub use session::{
    CommandResult, FaultDisposition, FaultEvent, HostServices, PayloadFactory, PayloadModel,
    PayloadServices, SessionCollaborators, SessionContext, SessionState, SessionSupervisor,
};
pub use transaction::{with_transaction, HostTransaction};
