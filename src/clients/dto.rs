use serde::{Deserialize, Serialize};

use super::repo_types::{Client, ClientDetails};
use crate::auth::services::{is_valid_email, normalize_email};

#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub company: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Trim and validate contact details; the error is the message sent back.
pub fn validate_details(
    name: &str,
    email: &str,
    company: Option<String>,
    address: Option<String>,
    phone: Option<String>,
) -> Result<ClientDetails, &'static str> {
    let name = name.trim().to_string();
    let email = normalize_email(email);
    if name.is_empty() || email.is_empty() {
        return Err("Client name and email are required.");
    }
    if !is_valid_email(&email) {
        return Err("Invalid client email address.");
    }
    Ok(ClientDetails {
        name,
        email,
        company: non_empty(company),
        address: non_empty(address),
        phone: non_empty(phone),
    })
}

impl ClientRequest {
    pub fn into_details(self) -> Result<ClientDetails, &'static str> {
        validate_details(&self.name, &self.email, self.company, self.address, self.phone)
    }
}

#[derive(Debug, Serialize)]
pub struct ClientList {
    pub clients: Vec<Client>,
}

#[derive(Debug, Serialize)]
pub struct ClientEnvelope {
    pub client: Client,
}
