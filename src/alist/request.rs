use serde::{Deserialize, Serialize};

/// Every alist endpoint answers with this envelope; `code == 200` is success.
#[derive(Debug, Deserialize)]
pub struct Response<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn is_success(&self) -> bool {
        self.code == 200
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct PathRequest<'a> {
    pub path: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ListRequest<'a> {
    pub path: &'a str,
    pub password: &'a str,
    pub page: u32,
    pub per_page: u32,
    pub refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct AddOfflineDownloadRequest<'a> {
    pub path: &'a str,
    pub urls: Vec<&'a str>,
    pub tool: &'a str,
    pub delete_policy: &'a str,
}
