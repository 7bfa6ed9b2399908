pub mod deferred;
pub mod http_result;
pub mod obey;

use crate::bearerbox::BearerboxFrame;
use crate::state::AppState;
use tracing::{debug, warn};
use urltrans::UrlTranslation;

/// Splits `msg` per the translation's header/footer/suffix/concatenation
/// settings and writes every resulting part to the bearerbox (spec.md
/// §4.6 step 7 / §4.7 step 6). A nonzero `msg.deferred` holds the message
/// back via the timer heap (C1) instead of sending it immediately; the
/// deferred-dispatch worker calls back in with `deferred` cleared once the
/// timer elapses.
pub fn send_message(state: &AppState, t: Option<&UrlTranslation>, msg: sms_proto::Message) {
    if msg.deferred > 0 {
        let minutes = msg.deferred;
        let mut msg = msg;
        msg.deferred = 0;
        debug!(minutes, "send_message: deferring via timer heap");
        state.schedule_deferred(msg, t.cloned(), minutes);
        return;
    }
    if msg.msgdata.is_empty() && t.is_some_and(|t| t.omit_empty) {
        debug!("send_message: empty payload omitted per translation config");
        return;
    }
    let max_messages = t.and_then(|t| t.max_messages);
    if max_messages == Some(0) {
        debug!("send_message: max_messages=0, message denied");
        return;
    }

    let cfg = sms_split::SplitConfig {
        header: t.and_then(|t| t.header.clone()),
        footer: t.and_then(|t| t.footer.clone()),
        nonlast_suffix: t.and_then(|t| t.split_suffix.clone()),
        split_chars: t.and_then(|t| t.split_chars.clone()),
        catenate: t.is_some_and(|t| t.concatenation),
        max_messages,
        max_octets: state.max_octets,
    };
    let seq = state.counters.catenated_sms_counter.next_catenation_ref();
    let parts = sms_split::sms_split(&msg, &cfg, seq);

    for part in parts {
        if let Err(e) = state.bearerbox.write_message(&BearerboxFrame::Sms(part)) {
            warn!(error = %e, "failed to write message part to bearerbox");
        }
    }
}
