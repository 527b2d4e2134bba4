//! Session authority for hwbridge.
//!
//! Maps each device path to at most one exclusive session. The mapping lives
//! in a single task ([`SessionsBackground`]) that handles requests one at a
//! time; everything else talks to it through a [`SessionsClient`].
//!
//! Acquire and release are split into intent and done steps so the caller can
//! open or close the physical device in between and roll back on failure.

pub mod background;
pub mod client;
pub mod error;
pub mod types;

pub use background::SessionsBackground;
pub use client::SessionsClient;
pub use error::{Result, SessionsError};
pub use types::{Acquired, Descriptor, SessionId, SessionsRequest, SessionsResponse};
