//! The central message record that flows between every smsbox component.

use serde::{Deserialize, Serialize};

/// Which leg of the gateway a [`Message`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmsType {
    /// Mobile-originated: arrived from the bearerbox.
    Mo,
    /// Mobile-terminated, pushed by a service without a triggering MO.
    MtPush,
    /// Mobile-terminated, sent in reply to an MO.
    MtReply,
    /// Acknowledgement sent back to the bearerbox for an MO it delivered.
    Ack,
    /// Administrative control message (e.g. shutdown).
    Admin,
}

/// Bitmask of DLR event classes a submitter can request.
pub mod dlr_mask {
    pub const SUCCESS: u32 = 0x01;
    pub const FAIL: u32 = 0x02;
    pub const BUFFERED: u32 = 0x04;
    pub const SMSC_SUCCESS: u32 = 0x08;
    pub const SMSC_FAIL: u32 = 0x10;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("flag_flash and flag_mwi are mutually exclusive")]
    FlashMwiConflict,
    #[error("udhdata present but flag_udh is not set")]
    UdhFlagMismatch,
    #[error("udh length octet ({declared}) does not match udhdata length ({actual})")]
    UdhLengthMismatch { declared: u8, actual: usize },
    #[error("flag_unicode requires flag_8bit")]
    UnicodeRequires8Bit,
    #[error("flag_mwi must be in 0..=8, got {0}")]
    MwiOutOfRange(u8),
}

/// The central message record (spec.md §3).
///
/// Constructed with [`Message::new`] and mutated through its public fields;
/// [`Message::validate`] checks the cross-field invariants the spec
/// demands. Nothing in this crate enforces the invariants automatically on
/// every mutation -- callers that build a `Message` piecemeal (as the obey
/// loop does while swapping addresses) call `validate` once they are done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sms_type: SmsType,
    pub sender: String,
    pub receiver: String,
    pub smsc_id: Option<String>,
    pub service: Option<String>,
    pub msgdata: Vec<u8>,
    pub udhdata: Option<Vec<u8>>,

    pub flag_8bit: bool,
    pub flag_udh: bool,
    pub flag_flash: bool,
    pub flag_mwi: u8,
    pub mwimessages: u8,
    pub flag_unicode: bool,

    pub validity: u32,
    pub deferred: u32,

    pub dlr_mask: u32,
    pub dlr_id: Option<String>,
    pub dlr_keyword: Option<String>,

    pub time: i64,
    pub id: Option<String>,

    /// Owning smsbox instance, carried through DLR rows (see
    /// `gw/dlr_mongodb.c`'s `boxc_id` field). Opaque to routing logic.
    pub boxc_id: Option<String>,
    /// Opaque per-message metadata passthrough (see `gw/meta_data.h`).
    /// Never interpreted by the core; forwarded as received.
    pub account: Option<String>,
}

impl Message {
    pub fn new(sms_type: SmsType, sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Message {
            sms_type,
            sender: sender.into(),
            receiver: receiver.into(),
            smsc_id: None,
            service: None,
            msgdata: Vec::new(),
            udhdata: None,
            flag_8bit: false,
            flag_udh: false,
            flag_flash: false,
            flag_mwi: 0,
            mwimessages: 0,
            flag_unicode: false,
            validity: 0,
            deferred: 0,
            dlr_mask: 0,
            dlr_id: None,
            dlr_keyword: None,
            time: 0,
            id: None,
            boxc_id: None,
            account: None,
        }
    }

    /// Checks the invariants listed in spec.md §3.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.flag_flash && self.flag_mwi != 0 {
            return Err(MessageError::FlashMwiConflict);
        }
        if self.flag_mwi > 8 {
            return Err(MessageError::MwiOutOfRange(self.flag_mwi));
        }
        if let Some(udh) = &self.udhdata {
            if !udh.is_empty() {
                if !self.flag_udh {
                    return Err(MessageError::UdhFlagMismatch);
                }
                let declared = udh[0] as usize;
                let actual = udh.len() - 1;
                if declared != actual {
                    return Err(MessageError::UdhLengthMismatch {
                        declared: udh[0],
                        actual,
                    });
                }
            }
        }
        if self.flag_unicode && !self.flag_8bit {
            return Err(MessageError::UnicodeRequires8Bit);
        }
        Ok(())
    }

    /// Strips DLR correlators from a duplicate part; spec.md §4.4 step 1
    /// ("DLR applies only to the first part").
    pub fn strip_dlr(&mut self) {
        self.dlr_id = None;
        self.dlr_keyword = None;
        self.dlr_mask = 0;
    }

    pub fn udh_len(&self) -> usize {
        self.udhdata.as_ref().map_or(0, |u| u.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Message {
        Message::new(SmsType::Mo, "+1", "+2")
    }

    #[test]
    fn flash_and_mwi_conflict() {
        let mut m = plain();
        m.flag_flash = true;
        m.flag_mwi = 1;
        assert_eq!(m.validate(), Err(MessageError::FlashMwiConflict));
    }

    #[test]
    fn udh_without_flag_is_rejected() {
        let mut m = plain();
        m.udhdata = Some(vec![2, 0, 0]);
        assert_eq!(m.validate(), Err(MessageError::UdhFlagMismatch));
    }

    #[test]
    fn udh_length_mismatch_is_rejected() {
        let mut m = plain();
        m.flag_udh = true;
        m.udhdata = Some(vec![5, 0, 0]);
        assert_eq!(
            m.validate(),
            Err(MessageError::UdhLengthMismatch {
                declared: 5,
                actual: 2
            })
        );
    }

    #[test]
    fn consistent_udh_is_accepted() {
        let mut m = plain();
        m.flag_udh = true;
        m.udhdata = Some(vec![2, 0, 0]);
        assert_eq!(m.validate(), Ok(()));
    }

    #[test]
    fn unicode_requires_8bit() {
        let mut m = plain();
        m.flag_unicode = true;
        assert_eq!(m.validate(), Err(MessageError::UnicodeRequires8Bit));
    }

    #[test]
    fn strip_dlr_clears_correlators() {
        let mut m = plain();
        m.dlr_mask = dlr_mask::SUCCESS;
        m.dlr_id = Some("abc".into());
        m.dlr_keyword = Some("kw".into());
        m.strip_dlr();
        assert_eq!(m.dlr_mask, 0);
        assert!(m.dlr_id.is_none());
        assert!(m.dlr_keyword.is_none());
    }
}
