//! Vetrina: a self-hosted portfolio content service.
//!
//! Mirrors a static project archive (an HTML directory-listing host) into a
//! local snapshot cache and serves normalized project records plus
//! composited share cards over HTTP.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod scrape;
