// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for tandem.
//!
//! Hosts the chat hub actor, the per-connection WebSocket loops, and the REST
//! routes for locations, scores, matches, and chat history.

pub mod auth;
pub mod chat;
pub mod frame;
pub mod handlers;
pub mod hub;
pub mod server;
pub mod ws;

pub use auth::{AuthConfig, AuthUser};
pub use chat::ChatService;
pub use frame::{ChatFrame, InboundFrame, message_types};
pub use hub::{Client, ClientId, Hub, HubHandle, next_client_id};
pub use server::{ChatSettings, GatewayState, ServerConfig, bind, router, serve};
