//! Splits an outbound [`Message`] into one or more SMS-sized parts,
//! matching `gw/smsbox.c`'s `sms_split`/`extract_msgdata_part`/
//! `prepend_catenation_udh` trio byte-for-byte (spec.md §4.4 / C4).

use sms_proto::Message;

/// 5-octet concatenation information element: IEI (0x00), IE-length
/// (0x03), reference, total parts, part number.
pub const CATENATE_UDH_LEN: usize = 5;
pub const DEFAULT_MAX_OCTETS: usize = 140;

#[derive(Debug, Clone, Default)]
pub struct SplitConfig {
    pub header: Option<Vec<u8>>,
    pub footer: Option<Vec<u8>>,
    pub nonlast_suffix: Option<Vec<u8>>,
    pub split_chars: Option<Vec<u8>>,
    pub catenate: bool,
    /// `None` means unlimited.
    pub max_messages: Option<usize>,
    /// `0` is treated as [`DEFAULT_MAX_OCTETS`].
    pub max_octets: usize,
}

fn payload_budget(flag_8bit: bool, udh_len: usize, header_footer_len: usize, max_octets: usize) -> usize {
    let max_octets = max_octets as i64;
    let u = udh_len as i64;
    let h = header_footer_len as i64;
    let raw = if flag_8bit {
        max_octets - u - h
    } else {
        (max_octets * 8 / 7) - ((u * 8 + 6 + 6) / 7) - h
    };
    raw.max(0) as usize
}

/// Splits `original` per spec.md §4.4, returning the parts in order.
/// `seq` is the 8-bit catenation reference used when more than one part
/// results and `cfg.catenate` is set.
pub fn sms_split(original: &Message, cfg: &SplitConfig, seq: u8) -> Vec<Message> {
    let max_octets = if cfg.max_octets == 0 {
        DEFAULT_MAX_OCTETS
    } else {
        cfg.max_octets
    };
    let header_len = cfg.header.as_ref().map_or(0, |v| v.len());
    let footer_len = cfg.footer.as_ref().map_or(0, |v| v.len());
    let h = header_len + footer_len;
    let s = cfg.nonlast_suffix.as_ref().map_or(0, |v| v.len());
    let u0 = if original.flag_udh { original.udh_len() } else { 0 };

    // Concatenation is silently disabled for 7-bit messages or messages
    // that already carry a UDH.
    let catenate = cfg.catenate && original.flag_8bit && !original.flag_udh;

    let mut budget = payload_budget(original.flag_8bit, u0, h, max_octets);
    if original.msgdata.len() > budget && catenate {
        let u_prime = u0.max(1) + CATENATE_UDH_LEN;
        budget = payload_budget(original.flag_8bit, u_prime, h, max_octets);
    }
    // A zero or negative budget can't carry any payload; bail out with no
    // parts rather than looping forever.
    if budget == 0 {
        return Vec::new();
    }

    let mut parts: Vec<Message> = Vec::new();
    let mut cursor = 0usize;
    let data = &original.msgdata;

    loop {
        let part_no = parts.len() + 1;
        let remaining = &data[cursor..];
        let is_last_allowed = cfg.max_messages == Some(part_no);

        let (payload, is_last): (Vec<u8>, bool) = if remaining.len() <= budget || is_last_allowed {
            let take = remaining.len().min(budget);
            cursor += take;
            (remaining[..take].to_vec(), true)
        } else {
            let take_limit = budget.saturating_sub(s).min(remaining.len());
            let mut take = take_limit;
            if let Some(chars) = &cfg.split_chars {
                if take > 0 {
                    if let Some(pos) = (0..take).rev().find(|&i| chars.contains(&remaining[i])) {
                        take = pos + 1;
                    }
                }
            }
            cursor += take;
            let mut payload = remaining[..take].to_vec();
            if let Some(suffix) = &cfg.nonlast_suffix {
                payload.extend_from_slice(suffix);
            }
            (payload, false)
        };

        let mut full = Vec::with_capacity(header_len + payload.len() + footer_len);
        if let Some(header) = &cfg.header {
            full.extend_from_slice(header);
        }
        full.extend_from_slice(&payload);
        if let Some(footer) = &cfg.footer {
            full.extend_from_slice(footer);
        }

        let mut part = original.clone();
        if part_no > 1 {
            part.strip_dlr();
        }
        part.msgdata = full;
        parts.push(part);

        if is_last || cursor >= data.len() {
            break;
        }
        if cfg.max_messages == Some(part_no) {
            break;
        }
    }

    if catenate && parts.len() > 1 {
        prepend_catenation_udh(&mut parts, seq);
    }

    parts
}

/// Prepends a concatenation UDH (IEI 0x00, IE-len 0x03, `seq`, total
/// parts, part number) to every part, rewriting the UDHL octet.
fn prepend_catenation_udh(parts: &mut [Message], seq: u8) {
    let total = parts.len() as u8;
    for (i, part) in parts.iter_mut().enumerate() {
        let part_no = (i + 1) as u8;
        let mut udh = part.udhdata.clone().unwrap_or_default();
        if udh.is_empty() {
            udh.push(0);
        }
        udh.extend_from_slice(&[0x00, 0x03, seq, total, part_no]);
        udh[0] = (udh.len() - 1) as u8;
        part.udhdata = Some(udh);
        part.flag_udh = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_proto::SmsType;

    fn msg(data: &[u8]) -> Message {
        let mut m = Message::new(SmsType::MtReply, "+1", "+2");
        m.flag_8bit = true;
        m.msgdata = data.to_vec();
        m
    }

    #[test]
    fn short_message_is_a_single_part() {
        let m = msg(b"hello");
        let cfg = SplitConfig {
            max_octets: 140,
            ..Default::default()
        };
        let parts = sms_split(&m, &cfg, 0);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].msgdata, b"hello");
    }

    #[test]
    fn long_message_splits_into_multiple_parts_without_catenation() {
        let data = vec![b'a'; 300];
        let m = msg(&data);
        let cfg = SplitConfig {
            max_octets: 140,
            ..Default::default()
        };
        let parts = sms_split(&m, &cfg, 0);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].msgdata.len(), 140);
        assert_eq!(parts[2].msgdata.len(), 20);
        for p in &parts {
            assert!(!p.flag_udh);
        }
    }

    #[test]
    fn catenation_prepends_udh_to_every_part() {
        let data = vec![b'a'; 300];
        let m = msg(&data);
        let cfg = SplitConfig {
            max_octets: 140,
            catenate: true,
            ..Default::default()
        };
        let parts = sms_split(&m, &cfg, 7);
        assert!(parts.len() > 1);
        for (i, p) in parts.iter().enumerate() {
            assert!(p.flag_udh);
            let udh = p.udhdata.as_ref().unwrap();
            assert_eq!(udh[0] as usize, udh.len() - 1);
            let tail = &udh[udh.len() - 5..];
            assert_eq!(tail[0], 0x00);
            assert_eq!(tail[1], 0x03);
            assert_eq!(tail[2], 7);
            assert_eq!(tail[3] as usize, parts.len());
            assert_eq!(tail[4] as usize, i + 1);
        }
    }

    #[test]
    fn catenation_disabled_for_7bit_messages() {
        let mut m = msg(&vec![b'a'; 300]);
        m.flag_8bit = false;
        let cfg = SplitConfig {
            max_octets: 140,
            catenate: true,
            ..Default::default()
        };
        let parts = sms_split(&m, &cfg, 0);
        for p in &parts {
            assert!(!p.flag_udh);
        }
    }

    #[test]
    fn only_first_part_keeps_dlr_correlators() {
        let mut m = msg(&vec![b'a'; 300]);
        m.dlr_mask = sms_proto::dlr_mask::SUCCESS;
        m.dlr_id = Some("corr".into());
        let cfg = SplitConfig {
            max_octets: 140,
            ..Default::default()
        };
        let parts = sms_split(&m, &cfg, 0);
        assert!(parts[0].dlr_id.is_some());
        assert!(parts[1].dlr_id.is_none());
        assert_eq!(parts[1].dlr_mask, 0);
    }

    #[test]
    fn max_messages_truncates_and_discards_overflow() {
        let data = vec![b'a'; 1000];
        let m = msg(&data);
        let cfg = SplitConfig {
            max_octets: 140,
            max_messages: Some(2),
            ..Default::default()
        };
        let parts = sms_split(&m, &cfg, 0);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].msgdata.len(), 140);
    }

    #[test]
    fn split_chars_breaks_on_word_boundary() {
        let mut data = vec![b'a'; 139];
        data.push(b' ');
        data.extend_from_slice(b"tail");
        let m = msg(&data);
        let cfg = SplitConfig {
            max_octets: 140,
            split_chars: Some(vec![b' ']),
            ..Default::default()
        };
        let parts = sms_split(&m, &cfg, 0);
        assert_eq!(parts[0].msgdata.len(), 140);
        assert_eq!(parts[1].msgdata, b"tail");
    }
}
