//! Framework layer - what handler code touches.
//!
//! - [`ChatIo`]: the per-event facade for replying, sending and unsending
//! - [`LogEventView`]: typed access to log events

pub mod io;
pub mod log_view;

pub use io::{ChatIo, ERROR_HEADER, format_error};
pub use log_view::{DEFAULT_SUMMARY_LENGTH, LogEventView, NicknameChange};
