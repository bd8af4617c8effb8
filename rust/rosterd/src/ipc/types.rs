use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::roster::IdGenerator;
use crate::session::CurrentUser;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub user: Option<CurrentUser>,
    /// Shared by every request so minted stamps keep increasing.
    pub ids: IdGenerator,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            user: None,
            ids: IdGenerator::system(),
        }
    }
}
