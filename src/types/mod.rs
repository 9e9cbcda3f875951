//! OpenAI-compatible wire types for chat completion requests, responses and
//! streaming chunks.

pub mod chunk;
pub mod request;
pub mod response;

pub use chunk::{ChatCompletionChunk, ChunkChoice, Delta};
pub use request::{ChatCompletionRequest, Message, MessageContent, MessageRole, ResponseFormat};
pub use response::{ChatCompletionResponse, Choice, ResponseMessage, Usage};
