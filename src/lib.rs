//! Backoffice - an RBAC administrative back-office
//!
//! This crate provides user, role, menu, department, post and dictionary
//! management behind a token login. Its core is the permission resolver,
//! which turns a user's roles into permission strings and a sidebar menu
//! tree, and the tree builder that assembles flat parent-linked records.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod permission;
pub mod routes;
pub mod state;
pub mod tree;

// Re-export commonly used types
pub use config::Config;
pub use permission::{PermissionResolver, ResolvedAccess};
pub use state::AppState;
