//! Services — business logic and persistence, one module per concern.
//!
//! Route handlers stay thin: they authenticate, parse, call into here, and
//! map errors to status codes. Everything stateful lives behind these
//! functions.

pub mod ai;
pub mod auth;
pub mod chat;
pub mod notify;
pub mod offer;
pub mod payment;
pub mod realtime;
pub mod request;
pub mod review;
pub mod user;
