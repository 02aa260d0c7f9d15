//! Metrics and observability infrastructure for gale.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: Prometheus recorder installation; the rendered text is
//!   served from the main HTTP router

pub mod events;
pub mod server;

pub use server::install_recorder;

/// Emit an internal event as a Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use gale::metrics::events::RowsLoaded;
///
/// emit!(RowsLoaded { count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
