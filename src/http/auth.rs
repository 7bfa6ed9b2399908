//! Sendsms/sendota authentication (spec.md §4.8): the username names a
//! translation entry; its password is compared constant-time unless the
//! entry delegates to a [`CredentialValidator`] (the `pam` field; the
//! actual PAM system library is out of scope per spec.md §1, so this is
//! a pluggable trait with a static-table default).

use std::net::IpAddr;
use subtle::ConstantTimeEq;
use urltrans::UrlTranslation;

pub trait CredentialValidator: Send + Sync {
    fn validate(&self, username: &str, password: &str) -> bool;
}

/// Default validator: a fixed username/password table, for deployments
/// that configure `pam = true` translations without wiring in a real
/// PAM-backed validator.
pub struct StaticTableValidator {
    table: std::collections::HashMap<String, String>,
}

impl StaticTableValidator {
    pub fn new(table: std::collections::HashMap<String, String>) -> Self {
        StaticTableValidator { table }
    }
}

impl CredentialValidator for StaticTableValidator {
    fn validate(&self, username: &str, password: &str) -> bool {
        match self.table.get(username) {
            Some(expected) => constant_time_eq(expected, password),
            None => false,
        }
    }
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    UnknownUser,
    BadPassword,
    IpDenied,
}

/// Authenticates `(username, password)` against the translation it
/// names, then checks `allow_ip`/`deny_ip`. Returns the matched
/// translation on success.
pub fn authenticate<'a>(
    translations: &'a [UrlTranslation],
    validator: &dyn CredentialValidator,
    username: &str,
    password: &str,
    client_ip: IpAddr,
) -> Result<&'a UrlTranslation, AuthError> {
    let t = translations
        .iter()
        .find(|t| t.name == username)
        .ok_or(AuthError::UnknownUser)?;

    let ok = if t.pam {
        validator.validate(username, password)
    } else {
        match &t.password {
            Some(expected) => constant_time_eq(expected, password),
            None => false,
        }
    };
    if !ok {
        return Err(AuthError::BadPassword);
    }

    if !ip_allowed(&t.allow_ip, &t.deny_ip, client_ip) {
        return Err(AuthError::IpDenied);
    }

    Ok(t)
}

fn ip_allowed(allow: &[String], deny: &[String], ip: IpAddr) -> bool {
    let ip_str = ip.to_string();
    if deny.iter().any(|d| d == &ip_str) {
        return false;
    }
    if allow.is_empty() {
        return true;
    }
    allow.iter().any(|a| a == &ip_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use urltrans::TransType;

    fn translation(name: &str, password: &str) -> UrlTranslation {
        UrlTranslation {
            name: name.to_string(),
            username: None,
            password: Some(password.to_string()),
            pattern: "ok".to_string(),
            kind: TransType::Text,
            faked_sender: None,
            forced_smsc: None,
            default_smsc: None,
            smsc_id: None,
            allow_ip: vec![],
            deny_ip: vec![],
            white_list: vec![],
            black_list: vec![],
            header: None,
            footer: None,
            split_suffix: None,
            split_chars: None,
            concatenation: false,
            max_messages: None,
            prefix: None,
            suffix: None,
            accept_x_kannel_headers: false,
            send_sender: false,
            omit_empty: false,
            assume_plain_text: false,
            reply_couldnotfetch: None,
            reply_couldnotrepresent: None,
            pam: false,
        }
    }

    #[test]
    fn correct_password_authenticates() {
        let entries = vec![translation("alice", "secret")];
        let validator = StaticTableValidator::new(Default::default());
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(authenticate(&entries, &validator, "alice", "secret", ip).is_ok());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let entries = vec![translation("alice", "secret")];
        let validator = StaticTableValidator::new(Default::default());
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(
            authenticate(&entries, &validator, "alice", "wrong", ip).unwrap_err(),
            AuthError::BadPassword
        );
    }

    #[test]
    fn deny_ip_rejects_matching_client() {
        let mut t = translation("alice", "secret");
        t.deny_ip = vec!["10.0.0.5".to_string()];
        let entries = vec![t];
        let validator = StaticTableValidator::new(Default::default());
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(
            authenticate(&entries, &validator, "alice", "secret", ip).unwrap_err(),
            AuthError::IpDenied
        );
    }

    #[test]
    fn pam_translation_delegates_to_validator() {
        let mut t = translation("alice", "unused");
        t.pam = true;
        let entries = vec![t];
        let mut table = std::collections::HashMap::new();
        table.insert("alice".to_string(), "pam-secret".to_string());
        let validator = StaticTableValidator::new(table);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(authenticate(&entries, &validator, "alice", "pam-secret", ip).is_ok());
        assert!(authenticate(&entries, &validator, "alice", "unused", ip).is_err());
    }
}
