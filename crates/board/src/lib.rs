pub mod client;
pub mod codec;
pub mod render;
pub mod template;

pub use client::{BoardClient, BoardState};
pub use codec::BoardModel;
pub use render::render;
pub use template::{Format, Template, Truncation, VariableMap};
