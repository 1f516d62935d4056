//! Chat addresses (JIDs).
//!
//! Private chats live under `@s.whatsapp.net`, groups under `@g.us`.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const USER_SERVER: &str = "s.whatsapp.net";
pub const LEGACY_USER_SERVER: &str = "c.us";
pub const GROUP_SERVER: &str = "g.us";

/// Country code every MSISDN must start with.
pub const COUNTRY_CODE: &str = "62";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@` (or the whole string when there is no server).
    pub fn user(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(u, _)| u)
    }

    pub fn server(&self) -> Option<&str> {
        self.0.split_once('@').map(|(_, s)| s)
    }

    pub fn is_group(&self) -> bool {
        self.server() == Some(GROUP_SERVER)
    }

    pub fn is_private(&self) -> bool {
        self.server() == Some(USER_SERVER)
    }

    /// Drop the `:device` suffix from the user part and map the legacy
    /// `c.us` server onto `s.whatsapp.net`.
    ///
    /// `628123:12@s.whatsapp.net` becomes `628123@s.whatsapp.net`.
    pub fn normalized_user(&self) -> Self {
        let Some((user, server)) = self.0.split_once('@') else {
            return self.clone();
        };
        let user = user.split_once(':').map_or(user, |(u, _)| u);
        let server = if server == LEGACY_USER_SERVER {
            USER_SERVER
        } else {
            server
        };
        Self(format!("{user}@{server}"))
    }

    /// Build a private-chat address from a phone-number style input.
    ///
    /// A full `@s.whatsapp.net` address is accepted as-is (normalized).
    /// Otherwise non-digits are stripped, a leading `0` becomes the country
    /// code, and the result must be the country code followed by 6-15 digits.
    pub fn private_from_msisdn(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if input.ends_with(&format!("@{USER_SERVER}")) {
            return Some(Self::new(input).normalized_user());
        }

        let mut digits: String = input.chars().filter(char::is_ascii_digit).collect();
        if let Some(rest) = digits.strip_prefix('0') {
            digits = format!("{COUNTRY_CODE}{rest}");
        }
        let national = digits.strip_prefix(COUNTRY_CODE)?;
        if !(6..=15).contains(&national.len()) {
            return None;
        }
        Some(Self(format!("{digits}@{USER_SERVER}")))
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Jid {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
