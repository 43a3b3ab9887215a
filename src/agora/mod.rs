// src/agora/mod.rs

pub mod agent;
pub mod bus;
pub mod client_wrapper;
pub mod config;
pub mod decision;
pub mod decision_extractor;
pub mod event;
pub mod meeting;
pub mod message;
pub mod termination;
pub mod tool_protocol;
pub mod tool_protocols;

// Let's explicitly export the meeting types so callers can write agora::Meeting
// instead of agora::meeting::Meeting
pub use meeting::{Meeting, MeetingError, MeetingSummary};
