//! Engine wire format
//!
//! `dto` is what we send; `decode` is how we read what comes back.

pub mod decode;
pub mod dto;
