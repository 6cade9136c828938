//! Model client implementations

pub mod gemini;
