//! # relay-protocol: canonical chat relay types
//!
//! Every inbound webhook and every outbound send is reduced to one [`Event`]
//! shape before it reaches the broadcast buffer or a live viewer. This crate
//! holds that shape plus the small vocabulary around it.
//!
//! It carries no runtime dependencies (no tokio, axum, or reqwest) so the
//! normalizers and the buffer can share it as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`event`]: Event, Direction, and the placeholder literals
//! - [`platform`]: Platform (whatsapp, instagram, bale)
//! - [`contact`]: Contact (passively learned directory entry)

pub mod contact;
pub mod event;
pub mod platform;

pub use contact::Contact;
pub use event::{Direction, Event, NO_TEXT, OPERATOR, UNKNOWN_SENDER};
pub use platform::Platform;
