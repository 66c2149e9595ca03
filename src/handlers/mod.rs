//! Request handlers module

pub mod audit;
pub mod auth;
pub mod dept;
pub mod dict;
pub mod menu;
pub mod post;
pub mod role;
pub mod user;

use axum::http::HeaderMap;
use serde::Serialize;
use std::collections::HashSet;

use crate::entity::oper_log::{BusinessType, NewOperLog};
use crate::entity::{STATUS_DISABLED, STATUS_NORMAL};
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 100;

/// 1-based page request, clamped to sane bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub num: u64,
    pub size: u64,
}

impl Page {
    pub fn new(num: Option<u64>, size: Option<u64>) -> Self {
        Self {
            num: num.unwrap_or(1).max(1),
            size: size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.num - 1) * self.size
    }
}

/// List payload: one page of rows plus the unpaged total
#[derive(Debug, Serialize)]
pub struct PageResult<T: Serialize> {
    pub rows: Vec<T>,
    pub total: u64,
}

/// Trimmed, non-empty query filter
pub fn filter_value(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Status flags accept only "0" (normal) and "1" (disabled)
pub fn validate_status(status: &str) -> AppResult<()> {
    if status == STATUS_NORMAL || status == STATUS_DISABLED {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid status '{}'", status)))
    }
}

/// Required text field, trimmed
pub fn required(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Trimmed ids, blanks and repeats dropped, first occurrence kept
pub fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

/// Caller address as reported by a fronting proxy
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Operation log entry for a request made by `user`
pub fn oper_entry(
    user: &CurrentUser,
    title: &str,
    business_type: BusinessType,
    method: &str,
    url: &str,
    headers: &HeaderMap,
) -> NewOperLog {
    NewOperLog::new(title, business_type, &user.username)
        .with_request(method, url)
        .with_ip(client_ip(headers))
}

/// Browser and OS names from a user agent string
pub fn user_agent_parts(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let Some(agent) = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    else {
        return (None, None);
    };

    let browser = ["Edg", "Chrome", "Firefox", "Safari"]
        .into_iter()
        .find(|name| agent.contains(name))
        .map(|name| if name == "Edg" { "Edge" } else { name });
    let os = [
        ("Windows", "Windows"),
        ("Android", "Android"),
        ("iPhone", "iOS"),
        ("Mac OS", "macOS"),
        ("Linux", "Linux"),
    ]
    .into_iter()
    .find(|(needle, _)| agent.contains(needle))
    .map(|(_, name)| name);

    (
        Some(browser.unwrap_or("Unknown").to_string()),
        Some(os.unwrap_or("Unknown").to_string()),
    )
}
