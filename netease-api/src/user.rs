//! Account endpoint.
//!
//! `POST /weapi/nuser/account/get` takes no parameters; identity comes from
//! the `MUSIC_U` cookie alone. An expired cookie answers with code 301, and
//! an anonymous one with code 200 and `"profile": null`. Both surface as
//! [`NeteaseError::NotLoggedIn`].

use crate::client::NeteaseClient;
use crate::crypto::RequestEnvelope;
use crate::error::{NeteaseError, Result};
use crate::types::UserProfile;

impl NeteaseClient {
    /// Profile of the account behind the current session.
    pub async fn user_info(&self) -> Result<UserProfile> {
        self.require_login()?;
        let resp = self
            .request(&RequestEnvelope::new("/nuser/account/get"))
            .await?;
        UserProfile::from_account(&resp).ok_or(NeteaseError::NotLoggedIn)
    }
}
