//! Wire format types for the vendor APIs
//!
//! Each module contains pure serde structs matching one vendor's JSON format.
//! They are only used at the HTTP boundary; everything else works with
//! [`crate::types`].

pub mod anthropic;
pub mod google;
pub mod openai;
