//! Metrics and observability infrastructure.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

pub use server::init;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric. Without an installed
/// recorder the metric call is a no-op.
///
/// # Example
///
/// ```ignore
/// use flurry::metrics::events::{RecordProcessed, RecordStatus};
///
/// emit!(RecordProcessed { status: RecordStatus::Stored });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
