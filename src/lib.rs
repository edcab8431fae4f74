//! Mail agent: opens helpdesk tickets for unread support mail.

pub mod config;
pub mod error;
pub mod http;
pub mod mail;
pub mod marker;
pub mod poller;
pub mod reconcile;
pub mod session;
pub mod ticketing;
