use std::time::Duration;

use serde::Serialize;

use crate::reporting::domain::directory_client::{DirectoryClient, DirectoryError};

const REGISTER_PATH: &str = "/api/upload_face";
const EQUIPPED_PATH: &str = "/api/update_helmet";

#[derive(Serialize)]
struct RegisterPayload<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct EquippedPayload<'a> {
    name: &'a str,
    has_helmet: bool,
}

/// Personnel directory reached over HTTP with JSON bodies.
pub struct HttpDirectoryClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpDirectoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), DirectoryError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }
}

impl DirectoryClient for HttpDirectoryClient {
    fn register_identity(&self, name: &str) -> Result<(), DirectoryError> {
        self.post(REGISTER_PATH, &RegisterPayload { name })
    }

    fn set_equipped(&self, name: &str, equipped: bool) -> Result<(), DirectoryError> {
        self.post(
            EQUIPPED_PATH,
            &EquippedPayload {
                name,
                has_helmet: equipped,
            },
        )
    }
}
