//! Small cross-cutting utilities shared by the page/codec/cache layers.
pub mod num;
