// libs/video-conferencing-cell/src/lib.rs
//! # Video Conferencing Cell
//!
//! Issues signed room tokens for video consultations. The media plane is run
//! by the external video provider; this cell only decides who may enter a
//! room and with which rights.
//!
//! - Room name: `consultation-{id}`
//! - The assigned doctor joins as moderator, the patient as a participant
//! - Only `video`/`both` consultations that are `active` or `in_progress`
//!
//! ## API Endpoints
//!
//! - `POST /video/consultations/{id}/token` - Issue a room token

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{RoomClaims, VideoError, VideoRole, VideoToken};
pub use router::{video_routes, VideoState};
pub use services::VideoTokenService;
