pub mod request;

pub use request::{EmbeddingInput, EmbeddingsRequestBody};
