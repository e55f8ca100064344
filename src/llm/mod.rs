//! LLM opponent integration: stream events, the gateway port, and the
//! reveal pacer that shapes raw provider output for spectators.

mod events;
mod gateway;
mod pacer;

pub use events::{LlmAnswer, LlmEventStream, LlmStreamEvent};
pub use gateway::{LlmGateway, RoundContext};
pub use pacer::{RevealPacer, StreamingPolicy};
