//! Async HTTP result loop (spec.md §4.7 / C7). A single dedicated thread
//! drains completed service HTTP calls fired by the obey workers (C6)
//! and turns each into an outbound reply.

use super::send_message;
use crate::state::{AppState, HttpCompletion};
use sms_proto::KannelHeaders;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub fn run(state: Arc<AppState>) {
    loop {
        if state.is_shutting_down() {
            break;
        }
        let receiver = state.http_completions.1.clone();
        match receiver.recv() {
            Ok(completion) => handle_completion(&state, completion),
            Err(_) => break,
        }
    }
    debug!("http result worker exiting");
}

fn handle_completion(state: &AppState, completion: HttpCompletion) {
    state.counters.num_outstanding_requests.decrease();

    let Some(correlation) = state.take_correlation(&completion.correlation_id) else {
        warn!(id = %completion.correlation_id, "http completion with no matching correlation");
        return;
    };
    let t = &correlation.translation;
    let mut reply = correlation.skeleton;

    let mut octets = false;
    match completion.status {
        Some(200) => {
            let mime = completion
                .content_type
                .as_deref()
                .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
                .unwrap_or_default();
            let body = &completion.body;
            match mime.as_str() {
                "text/html" | "text/vnd.wap.wml" => {
                    let text = String::from_utf8_lossy(body);
                    let trimmed = extract_between(&text, t.prefix.as_deref(), t.suffix.as_deref());
                    reply.msgdata = strip_blanks(&html_to_text(trimmed)).into_bytes();
                }
                "text/plain" => {
                    reply.msgdata = strip_blanks(&String::from_utf8_lossy(body)).into_bytes();
                }
                "application/octet-stream" => {
                    reply.msgdata = body.clone();
                    octets = true;
                }
                _ => {
                    reply.msgdata = t
                        .reply_couldnotrepresent
                        .clone()
                        .unwrap_or_else(|| "Result could not be represented".to_string())
                        .into_bytes();
                }
            }

            if matches!(mime.as_str(), "text/html" | "text/vnd.wap.wml" | "text/plain" | "application/octet-stream") {
                let pairs: Vec<(&str, &str)> = completion
                    .headers
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                let headers = KannelHeaders::from_pairs(pairs);
                if t.accept_x_kannel_headers {
                    let dropped = headers.apply(&mut reply);
                    for name in dropped {
                        warn!(header = name, "X-Kannel-* header failed to parse, dropped");
                    }
                } else {
                    debug!("accept_x_kannel_headers is false; ignoring X-Kannel-* reply headers");
                }
            }
        }
        _ => {
            reply.msgdata = t
                .reply_couldnotfetch
                .clone()
                .unwrap_or_else(|| "Result could not be fetched".to_string())
                .into_bytes();
        }
    }

    reply.time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    if octets && !t.assume_plain_text {
        reply.flag_8bit = true;
    }

    send_message(state, Some(t), reply);
}

/// Returns the substring after the first occurrence of `prefix` (if any)
/// and before the first occurrence of `suffix` found in that remainder.
fn extract_between<'a>(body: &'a str, prefix: Option<&str>, suffix: Option<&str>) -> &'a str {
    let after_prefix = match prefix {
        Some(p) if !p.is_empty() => match body.find(p) {
            Some(idx) => &body[idx + p.len()..],
            None => body,
        },
        _ => body,
    };
    match suffix {
        Some(s) if !s.is_empty() => match after_prefix.find(s) {
            Some(idx) => &after_prefix[..idx],
            None => after_prefix,
        },
        _ => after_prefix,
    }
}

/// Minimal HTML/WML-to-text rendering: drops tags, keeps text content.
fn html_to_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn strip_blanks(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_between_trims_prefix_and_suffix() {
        let body = "junkSTART<payload>data</payload>ENDjunk";
        assert_eq!(
            extract_between(body, Some("START"), Some("END")),
            "<payload>data</payload>"
        );
    }

    #[test]
    fn html_to_text_drops_tags() {
        assert_eq!(html_to_text("<b>hello</b>  world"), "hello  world");
    }

    #[test]
    fn strip_blanks_collapses_whitespace() {
        assert_eq!(strip_blanks("  hello   world  \n"), "hello world");
    }
}
