//! Web admin panel: session-cookie auth, CSRF-protected form posts, and
//! the management routes over storage, the RAG index, and the services.

pub mod app;
pub mod auth;
mod http;

pub use app::{build_router, AdminState};
