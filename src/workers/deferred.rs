//! Deferred-send dispatch loop: drains `state.deferred_queue` for timers
//! elapsed off the timer heap (C1) and re-enters `send_message` with
//! `deferred` already cleared, so a `deferred=` sendsms request actually
//! delays delivery instead of being forwarded unconditionally.

use super::send_message;
use crate::state::AppState;
use std::sync::Arc;
use tracing::debug;

/// Runs until the process enters shutdown. Each elapsed deferred send is
/// handled independently, matching the obey/http-result workers' "one
/// message never unwinds into its neighbors" rule.
pub fn run(state: Arc<AppState>) {
    loop {
        if state.is_shutting_down() {
            break;
        }
        let send = state.deferred_queue.consume();
        state.forget_deferred(send.id);
        debug!(id = send.id, "deferred timer elapsed, dispatching");
        send_message(&state, send.translation.as_ref(), send.msg);
    }
    debug!("deferred worker exiting");
}
