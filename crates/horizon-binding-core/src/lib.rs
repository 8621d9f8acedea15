//! Core notification primitives for Horizon Binding.
//!
//! This crate provides the pieces every binding component builds on:
//!
//! - **Signal/Slot System**: Synchronous, reentrancy-tolerant notifications
//! - **Thread Affinity**: Checks that binding objects stay on the binding thread
//! - **Logging**: Tracing targets and span names for each binding subsystem
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_binding_core::Signal;
//!
//! let current_changed = Signal::<()>::new();
//!
//! let conn_id = current_changed.connect(|_| {
//!     println!("current row changed");
//! });
//!
//! current_changed.emit(());
//! current_changed.disconnect(conn_id);
//! ```

pub mod logging;
pub mod signal;
pub mod thread_check;

pub use logging::PerfSpan;
pub use signal::{ConnectionId, Signal};
pub use thread_check::ThreadAffinity;

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);
static_assertions::assert_impl_all!(Signal<(usize, isize)>: Send, Sync);
