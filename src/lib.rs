#[macro_use]
extern crate diesel;

#[macro_use]
extern crate diesel_migrations;

pub mod captcha;
pub mod config;
pub mod core;
pub mod csrf;
pub mod db;
pub mod error;
pub mod http;
pub mod oauth;
pub mod provider;
pub mod revocation;
pub mod saml;
pub mod sweep;
pub mod token;
pub mod util;
