pub mod request;
pub mod response;

pub use request::{ChatCompletionsRequestBody, StopConfiguration};
pub use response::ChatCompletionsResponse;
