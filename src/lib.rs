#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;

pub mod activity;
pub mod activity_store;
pub mod distance;
pub mod errors;
pub mod logs;
pub mod route_codec;
pub mod tracking_session;

pub use errors::{Error, Result};
