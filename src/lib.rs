//! EuAiTalk - voice chat gateway and client core
//!
//! The crate has three parts:
//! - the gateway ([`api`], [`upstream`], [`persona`], [`config`]): a
//!   stateless HTTP proxy that forwards speech-to-text and chat requests to
//!   the upstream provider, injecting a persona system prompt and the
//!   provider credential
//! - the client core ([`client`]): settings, quota tracking, backend health
//!   and the conversation pipeline with history rollback
//! - the mobile shell logic ([`shell`]): URL preference, permission
//!   delegation and the fallback page
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        Web front end / CLI / mobile shell    │
//! │   Orchestrator │ Settings │ Health │ Quota   │
//! └───────────────────────┬──────────────────────┘
//!                         │  /api/transcribe, /api/chat, /api/health
//! ┌───────────────────────▼──────────────────────┐
//! │                EuAiTalk gateway              │
//! │   Rate limit │ Persona prompt │ Credential   │
//! └───────────────────────┬──────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────┐
//! │          Upstream provider (Scaleway)        │
//! │          Speech-to-text │ Chat completion    │
//! └──────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod persona;
pub mod shell;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{ChatMessage, Role};
pub use persona::Persona;
