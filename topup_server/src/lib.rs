//! # Top-up store server
//! This crate hosts the HTTP surface of the top-up storefront. It is responsible for:
//! * Taking orders from signed-in customers and guests, and handing them to the order engine.
//! * Receiving RoboKassa payment result callbacks and sending customers back to the storefront afterwards.
//! * Giving administrators the order search, status and refund operations.
//! * Forwarding order events to the operators' Telegram chats.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following route groups:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/robokassa/*`: The gateway callback and the customer redirects.
//! * `/guest/*`: Checkout without an account.
//! * `/api/*`: Everything that needs a bearer token. `/api/admin/*` additionally needs the `admin` role.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
