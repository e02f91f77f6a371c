//! Input layer: export file formats and folder discovery
//!
//! This module turns the on-disk wearable and survey exports of a study into
//! typed event streams and survey responses.

mod export;
mod loader;

pub use export::*;
pub use loader::*;
