//! # docker-xylem
//!
//! `docker-xylem` is a Docker volume plugin that exposes GlusterFS volumes
//! managed by the xylem storage-orchestration service. Docker talks to it over
//! a Unix socket; on mount it asks xylem for the backing volume, mounts it on
//! the host with `mount -t glusterfs`, and hands Docker the resulting path.
//!
//! ## Feature Flags
//!
//! * `tls`: Enables `https` URLs for the xylem client (rustls with webpki roots).
pub mod cmd;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod path;
pub mod process;
pub mod signal;
pub mod volume;
pub mod xylem;
