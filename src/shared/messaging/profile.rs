//! Profile Data Structures
//!
//! Public profile of the other participant and the identity of the
//! signed-in user.

use serde::{Deserialize, Serialize};

use super::message::ParticipantId;

/// Public profile of a chat recipient
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecipientProfile {
    pub username: String,
    #[serde(default, alias = "_id")]
    pub id: Option<ParticipantId>,
    #[serde(default, alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    /// Avatar URL or data URI
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub is_chef: bool,
}

impl RecipientProfile {
    /// Name to show in the chat header
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// The signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    #[serde(alias = "_id")]
    pub id: ParticipantId,
    pub username: String,
}
