pub mod api_client;
pub mod gemini;
pub mod null;
