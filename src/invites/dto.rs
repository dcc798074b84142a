use serde::{Deserialize, Serialize};

use super::repo_types::Invite;
use crate::auth::repo_types::Role;

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    #[serde(default)]
    pub email: String,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct InviteEnvelope {
    pub invite: Invite,
}

#[derive(Debug, Serialize)]
pub struct InviteList {
    pub invites: Vec<Invite>,
}
