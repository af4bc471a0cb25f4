//! Notes domain module.
//!
//! This crate contains the note entity and its write-side validation rules,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod note;

pub use note::{NewNote, Note, MAX_TITLE_CHARS};
