//! URL-translation table: configured routing rules that map an inbound
//! MO keyword to a reply action (spec.md §3 URL translation entry, §4.5
//! / C5). Config is parsed the way the teacher's `services/forwarder`
//! loads its TOML: an all-`Option` `Raw*` struct deserialized first, then
//! validated/defaulted into the public type.

use serde::Deserialize;
use sms_proto::Message;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UrlTransError {
    #[error("failed to parse url-translation config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("translation {name:?} is missing a required `pattern`")]
    MissingPattern { name: String },
    #[error("translation {name:?} has unknown type {kind:?}")]
    UnknownType { name: String, kind: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransType {
    Text,
    File,
    GetUrl,
    PostUrl,
    Sendsms,
}

/// A single configured routing rule (spec.md §3's "URL translation
/// entry"), plus the `reply_couldnotfetch`/`reply_couldnotrepresent`/
/// `pam` fields SPEC_FULL.md §3 adds.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTranslation {
    pub name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pattern: String,
    pub kind: TransType,
    pub faked_sender: Option<String>,
    pub forced_smsc: Option<String>,
    pub default_smsc: Option<String>,
    /// Restricts this entry to MOs arriving via this `smsc_id`; `None`
    /// matches any SMSC. A scoped entry outranks an unscoped one sharing
    /// the same keyword (spec.md §4.5's "SMSC-scoped overrides").
    pub smsc_id: Option<String>,
    pub allow_ip: Vec<String>,
    pub deny_ip: Vec<String>,
    pub white_list: Vec<String>,
    pub black_list: Vec<String>,
    pub header: Option<Vec<u8>>,
    pub footer: Option<Vec<u8>>,
    pub split_suffix: Option<Vec<u8>>,
    pub split_chars: Option<Vec<u8>>,
    pub concatenation: bool,
    pub max_messages: Option<usize>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub accept_x_kannel_headers: bool,
    pub send_sender: bool,
    pub omit_empty: bool,
    pub assume_plain_text: bool,
    pub reply_couldnotfetch: Option<String>,
    pub reply_couldnotrepresent: Option<String>,
    /// Marks this entry as delegating authentication to a `CredentialValidator`
    /// rather than `username`/`password` (spec.md §4.8).
    pub pam: bool,
}

#[derive(Debug, Deserialize)]
struct RawUrlTranslation {
    name: Option<String>,
    username: Option<String>,
    password: Option<String>,
    pattern: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    faked_sender: Option<String>,
    forced_smsc: Option<String>,
    default_smsc: Option<String>,
    smsc_id: Option<String>,
    allow_ip: Option<Vec<String>>,
    deny_ip: Option<Vec<String>>,
    white_list: Option<Vec<String>>,
    black_list: Option<Vec<String>>,
    header: Option<String>,
    footer: Option<String>,
    split_suffix: Option<String>,
    split_chars: Option<String>,
    concatenation: Option<bool>,
    max_messages: Option<usize>,
    prefix: Option<String>,
    suffix: Option<String>,
    accept_x_kannel_headers: Option<bool>,
    send_sender: Option<bool>,
    omit_empty: Option<bool>,
    assume_plain_text: Option<bool>,
    reply_couldnotfetch: Option<String>,
    reply_couldnotrepresent: Option<String>,
    pam: Option<bool>,
}

impl RawUrlTranslation {
    fn into_translation(self) -> Result<UrlTranslation, UrlTransError> {
        let name = self.name.unwrap_or_default();
        let pattern = self.pattern.ok_or_else(|| UrlTransError::MissingPattern { name: name.clone() })?;
        let kind_str = self.kind.unwrap_or_else(|| "text".to_string());
        let kind = match kind_str.as_str() {
            "text" => TransType::Text,
            "file" => TransType::File,
            "get-url" | "get_url" => TransType::GetUrl,
            "post-url" | "post_url" => TransType::PostUrl,
            "sendsms" => TransType::Sendsms,
            other => {
                return Err(UrlTransError::UnknownType {
                    name,
                    kind: other.to_string(),
                })
            }
        };
        Ok(UrlTranslation {
            name,
            username: self.username,
            password: self.password,
            pattern,
            kind,
            faked_sender: self.faked_sender,
            forced_smsc: self.forced_smsc,
            default_smsc: self.default_smsc,
            smsc_id: self.smsc_id,
            allow_ip: self.allow_ip.unwrap_or_default(),
            deny_ip: self.deny_ip.unwrap_or_default(),
            white_list: self.white_list.unwrap_or_default(),
            black_list: self.black_list.unwrap_or_default(),
            header: self.header.map(String::into_bytes),
            footer: self.footer.map(String::into_bytes),
            split_suffix: self.split_suffix.map(String::into_bytes),
            split_chars: self.split_chars.map(String::into_bytes),
            concatenation: self.concatenation.unwrap_or(false),
            max_messages: self.max_messages,
            prefix: self.prefix,
            suffix: self.suffix,
            accept_x_kannel_headers: self.accept_x_kannel_headers.unwrap_or(false),
            send_sender: self.send_sender.unwrap_or(false),
            omit_empty: self.omit_empty.unwrap_or(false),
            assume_plain_text: self.assume_plain_text.unwrap_or(false),
            reply_couldnotfetch: self.reply_couldnotfetch,
            reply_couldnotrepresent: self.reply_couldnotrepresent,
            pam: self.pam.unwrap_or(false),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawUrlTransFile {
    #[serde(default)]
    translation: Vec<RawUrlTranslation>,
    sendsms_number_chars: Option<String>,
    white_list: Option<Vec<String>>,
    black_list: Option<Vec<String>>,
}

/// The loaded table of translations plus the global
/// `sendsms_number_chars` allow-list and the global `white_list`/
/// `black_list` spec.md §4.8 consults alongside each translation's own
/// (translation-scoped lists narrow the global ones further, they never
/// widen them).
pub struct UrlTransTable {
    entries: Vec<UrlTranslation>,
    pub sendsms_number_chars: String,
    pub white_list: Vec<String>,
    pub black_list: Vec<String>,
}

const DEFAULT_SENDSMS_NUMBER_CHARS: &str = "0123456789+- ";

impl UrlTransTable {
    pub fn from_toml_str(s: &str) -> Result<Self, UrlTransError> {
        let raw: RawUrlTransFile = toml::from_str(s)?;
        let entries = raw
            .translation
            .into_iter()
            .map(RawUrlTranslation::into_translation)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UrlTransTable {
            entries,
            sendsms_number_chars: raw
                .sendsms_number_chars
                .unwrap_or_else(|| DEFAULT_SENDSMS_NUMBER_CHARS.to_string()),
            white_list: raw.white_list.unwrap_or_default(),
            black_list: raw.black_list.unwrap_or_default(),
        })
    }

    pub fn entries(&self) -> &[UrlTranslation] {
        &self.entries
    }

    /// Finds the best-matching translation for an MO's `msgdata`,
    /// following spec.md §4.5: exact keyword prefix, SMSC-scoped entries
    /// outrank unscoped ones, and an entry with an empty `name` serves as
    /// the catch-all default.
    pub fn find(&self, msgdata: &[u8], smsc_id: Option<&str>) -> Option<&UrlTranslation> {
        let keyword = first_word_lowercase(msgdata);

        let scoped_match = self.entries.iter().find(|e| {
            !e.name.is_empty()
                && e.name.eq_ignore_ascii_case(&keyword)
                && e.smsc_id.as_deref() == smsc_id
                && smsc_id.is_some()
        });
        if scoped_match.is_some() {
            return scoped_match;
        }

        let keyword_match = self
            .entries
            .iter()
            .find(|e| !e.name.is_empty() && e.name.eq_ignore_ascii_case(&keyword) && e.smsc_id.is_none());
        if keyword_match.is_some() {
            return keyword_match;
        }

        self.entries.iter().find(|e| e.name.is_empty())
    }
}

fn first_word_lowercase(msgdata: &[u8]) -> String {
    let text = String::from_utf8_lossy(msgdata);
    text.split_whitespace().next().unwrap_or("").to_lowercase()
}

/// Expands `%s`/`%r`/`%t`/`%a` substitution escapes in `pattern` against
/// `msg`: sender, receiver, submission time, and the full message text.
pub fn expand_pattern(pattern: &str, msg: &Message) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push_str(&msg.sender),
            Some('r') => out.push_str(&msg.receiver),
            Some('t') => out.push_str(&msg.time.to_string()),
            Some('a') => out.push_str(&String::from_utf8_lossy(&msg.msgdata)),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_proto::SmsType;

    fn table(toml_str: &str) -> UrlTransTable {
        UrlTransTable::from_toml_str(toml_str).unwrap()
    }

    #[test]
    fn keyword_match_picks_the_named_translation() {
        let t = table(
            r#"
            [[translation]]
            name = "echo"
            pattern = "%a"
            type = "text"
            "#,
        );
        let hit = t.find(b"echo hello world", None).unwrap();
        assert_eq!(hit.name, "echo");
    }

    #[test]
    fn smsc_scoped_entry_outranks_unscoped_entry() {
        let t = table(
            r#"
            [[translation]]
            name = "echo"
            pattern = "generic"
            type = "text"

            [[translation]]
            name = "echo"
            pattern = "scoped"
            type = "text"
            smsc_id = "smsc1"
            "#,
        );
        let hit = t.find(b"echo", Some("smsc1")).unwrap();
        assert_eq!(hit.pattern, "scoped");
        let hit = t.find(b"echo", Some("other")).unwrap();
        assert_eq!(hit.pattern, "generic");
    }

    #[test]
    fn unmatched_keyword_falls_back_to_catch_all() {
        let t = table(
            r#"
            [[translation]]
            name = ""
            pattern = "default reply"
            type = "text"
            "#,
        );
        let hit = t.find(b"gibberish", None).unwrap();
        assert_eq!(hit.pattern, "default reply");
    }

    #[test]
    fn expand_pattern_substitutes_sender_and_receiver() {
        let mut m = Message::new(SmsType::Mo, "+1000", "+2000");
        m.msgdata = b"hi there".to_vec();
        assert_eq!(expand_pattern("from %s to %r: %a", &m), "from +1000 to +2000: hi there");
    }
}
