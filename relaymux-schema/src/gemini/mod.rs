mod generate_content_request;
mod v1beta_response;

pub use generate_content_request::GeminiGenerateContentRequest;
pub use generate_content_request::{Content, FunctionDeclaration, GenerationConfig, Part, Tool, ToolConfig};
pub use v1beta_response::Candidate;
pub use v1beta_response::GeminiResponseBody;
