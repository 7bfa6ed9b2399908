//! WAP-OTA provisioning bytecode (spec.md §6).
//!
//! Builds the fixed WBXML-family template used by sendota: a UDH-bearing
//! binary payload encoding one connectivity profile. Tokenization of
//! arbitrary OTA *documents* (the `wap/` subsystem) is out of scope per
//! spec.md §1; this only emits the fixed template described in spec.md §6.

/// `CONN_*` sentinels (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Temporary,
    Continuous,
    SecureTemporary,
    SecureContinuous,
}

impl ConnectionMode {
    fn token(self) -> u8 {
        match self {
            ConnectionMode::Temporary => 0x60,
            ConnectionMode::Continuous => 0x61,
            ConnectionMode::SecureTemporary => 0x62,
            ConnectionMode::SecureContinuous => 0x63,
        }
    }
}

/// `AUTH_*` sentinels (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Normal,
    Secure,
}

impl AuthMode {
    fn token(self) -> u8 {
        match self {
            AuthMode::Normal => 0x70,
            AuthMode::Secure => 0x71,
        }
    }
}

/// `SPEED_*` sentinels (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Speed9600,
    Speed14400,
}

impl Speed {
    fn code(self) -> &'static str {
        match self {
            Speed::Speed9600 => "6B",
            Speed::Speed14400 => "6C",
        }
    }
}

/// `BEARER_DATA` / `CALL_ISDN` and friends; only the data-call bearer is
/// named in spec.md §6, so it is the only variant exposed.
pub const BEARER_DATA: u8 = 0x45;
pub const CALL_ISDN: u8 = 0x73;

/// Fields of one `otaconfig` group (spec.md §4.8/§6).
#[derive(Debug, Clone)]
pub struct OtaProfile {
    pub bearer: u8,
    pub ip: String,
    pub connection: ConnectionMode,
    pub phone: String,
    pub auth: AuthMode,
    pub user: String,
    pub password: String,
    pub call_type: u8,
    pub speed: Speed,
    pub url: String,
    pub description: String,
}

fn push_attr_11_03(out: &mut Vec<u8>, token_prefix: &[u8], value: &str) {
    out.extend_from_slice(token_prefix);
    out.extend_from_slice(&[0x11, 0x03]);
    out.extend_from_slice(value.as_bytes());
    out.push(0x00);
}

/// Builds the fixed OTA provisioning bytecode for `profile`, as an 8-bit
/// UDH-bearing payload body (the UDH itself is attached by the caller via
/// [`sms_proto::Message`], not embedded here beyond the leading UDH token
/// sequence spec.md §6 specifies as part of the fixed template).
pub fn build_ota_bytecode(profile: &OtaProfile) -> Vec<u8> {
    let mut out = Vec::new();

    // UDH token sequence.
    out.extend_from_slice(&[0x06, 0x05, 0x04, 0xC3, 0x4F, 0xC0, 0x02]);
    // Body header.
    out.extend_from_slice(&[0x01, 0x06, 0x04, 0x03, 0x94, 0x81, 0xEA, 0x00, 0x01]);

    // bearer (8712)
    out.extend_from_slice(&[0x87, 0x12]);
    out.push(profile.bearer);

    // IP (87 13 11 03 ...)
    push_attr_11_03(&mut out, &[0x87, 0x13], &profile.ip);

    // connection (8714)
    out.extend_from_slice(&[0x87, 0x14]);
    out.push(profile.connection.token());

    // phone (87 21 11 03 ...)
    push_attr_11_03(&mut out, &[0x87, 0x21], &profile.phone);

    // auth (8722)
    out.extend_from_slice(&[0x87, 0x22]);
    out.push(profile.auth.token());

    // user (87 23 11 03 ...)
    push_attr_11_03(&mut out, &[0x87, 0x23], &profile.user);

    // password (87 24 11 03 ...)
    push_attr_11_03(&mut out, &[0x87, 0x24], &profile.password);

    // calltype (8728)
    out.extend_from_slice(&[0x87, 0x28]);
    out.push(profile.call_type);

    // speed (8729)
    out.extend_from_slice(&[0x87, 0x29]);
    out.extend_from_slice(profile.speed.code().as_bytes());

    // URL (86 07 11 03 ...)
    push_attr_11_03(&mut out, &[0x86, 0x07], &profile.url);

    // description (87 15 11 03 ...)
    push_attr_11_03(&mut out, &[0x87, 0x15], &profile.description);

    // terminator
    out.extend_from_slice(&[0x01, 0x01]);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OtaProfile {
        OtaProfile {
            bearer: BEARER_DATA,
            ip: "10.0.0.1".into(),
            connection: ConnectionMode::Continuous,
            phone: "5551234".into(),
            auth: AuthMode::Normal,
            user: "user".into(),
            password: "pass".into(),
            call_type: CALL_ISDN,
            speed: Speed::Speed9600,
            url: "http://wap.example.com".into(),
            description: "Example APN".into(),
        }
    }

    #[test]
    fn starts_with_fixed_udh_and_body_header() {
        let bytes = build_ota_bytecode(&sample());
        assert_eq!(&bytes[0..7], &[0x06, 0x05, 0x04, 0xC3, 0x4F, 0xC0, 0x02]);
        assert_eq!(
            &bytes[7..16],
            &[0x01, 0x06, 0x04, 0x03, 0x94, 0x81, 0xEA, 0x00, 0x01]
        );
    }

    #[test]
    fn ends_with_terminator() {
        let bytes = build_ota_bytecode(&sample());
        assert_eq!(&bytes[bytes.len() - 2..], &[0x01, 0x01]);
    }

    #[test]
    fn embeds_string_fields_null_terminated() {
        let bytes = build_ota_bytecode(&sample());
        let ip_token = [0x87u8, 0x13, 0x11, 0x03];
        let pos = bytes
            .windows(ip_token.len())
            .position(|w| w == ip_token)
            .expect("ip token present");
        let start = pos + ip_token.len();
        assert_eq!(&bytes[start..start + 8], b"10.0.0.1");
        assert_eq!(bytes[start + 8], 0x00);
    }
}
