use std::fmt;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Basic-auth pair attached to every Confluence request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Decode a `base64(username:password)` token. The password may itself contain `:`.
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(token.trim())
            .context("failed to decode --auth token as base64")?;
        let pair = String::from_utf8(bytes).context("--auth token is not valid UTF-8")?;
        let Some((username, password)) = pair.split_once(':') else {
            bail!("--auth token must encode `username:password`");
        };
        if username.is_empty() {
            bail!("--auth token has an empty username");
        }
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
