//! Generation service adapters.

mod openai;
mod throttled;

pub use openai::OpenAiCompatibleProvider;
pub use throttled::ThrottledGenerator;
