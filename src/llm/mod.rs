pub mod gemini;
pub mod media;
pub mod service;
pub mod types;

pub use gemini::GeminiClient;
