pub mod engine;
pub mod error;
pub mod message;
pub mod transport;

pub use engine::{DeliveryEngine, EngineConfig};
pub use error::SendError;
pub use message::{Grid, Hold, Message, MessageRequest};
pub use transport::Transport;
