//! Session handle: the `MUSIC_U` cookie and its on-disk persistence.
//!
//! The session file is stored at `~/.config/ncm/session.json` and contains:
//!
//! ```json
//! { "MUSIC_U": "00AABBCC..." }
//! ```
//!
//! The `MUSIC_U` cookie is the authentication token issued by Netease after
//! login. It can be obtained from browser developer tools → Application → Cookies
//! on `music.163.com`. Typical lifetime is several months.
//!
//! A [`Session`] is read-only once handed to the client: every signed call
//! receives it explicitly and nothing mutates it.

use crate::error::{NeteaseError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Login session (the `MUSIC_U` cookie value).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Session {
    /// The `MUSIC_U` authentication cookie value.
    #[serde(rename = "MUSIC_U")]
    pub music_u: Option<String>,
}

impl Session {
    pub fn new(music_u: impl Into<String>) -> Self {
        Self { music_u: Some(music_u.into()) }
    }

    /// Parse user input: either a bare `MUSIC_U` value or a full cookie
    /// string such as `"MUSIC_U=xxx; __csrf=yyy"`.
    pub fn from_cookie_input(input: &str) -> Self {
        let input = input.trim();
        if !input.contains('=') {
            return Self::new(input);
        }
        let music_u = input
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| name.trim() == "MUSIC_U")
            .map(|(_, value)| value.trim().to_owned())
            .filter(|v| !v.is_empty());
        Self { music_u }
    }

    /// Load session from `~/.config/ncm/session.json`.
    ///
    /// Returns a default (empty) session if the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load session from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Save session to disk, creating parent directories if needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        // The cookie is a bearer credential.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Delete the session file from disk. Returns whether a file was removed.
    pub fn clear() -> Result<bool> {
        let path = Self::default_path()?;
        if path.exists() {
            fs::remove_file(&path)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Build the `Cookie` HTTP header value for API requests.
    ///
    /// Returns `None` if no `MUSIC_U` is set. The header includes fixed
    /// fields expected by the Netease server: `os=pc`, `__remember_me=true`.
    pub fn cookie_header(&self) -> Option<String> {
        let music_u = self.music_u.as_deref().filter(|u| !u.is_empty())?;
        Some(format!("os=pc; __remember_me=true; MUSIC_U={music_u}"))
    }

    /// Check whether a `MUSIC_U` cookie is present (does not validate it).
    pub fn is_logged_in(&self) -> bool {
        self.music_u.as_ref().is_some_and(|u| !u.is_empty())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config = dirs::config_dir()
            .ok_or_else(|| NeteaseError::Other("cannot determine config directory".into()))?;
        Ok(config.join("ncm").join("session.json"))
    }
}
