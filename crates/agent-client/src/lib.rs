//! Agent runtimes: the HTTP webhook client and an offline echo runtime.

mod client;
mod echo;
mod error;
mod types;

pub use client::HttpAgentClient;
pub use echo::EchoAgent;
pub use error::{ClientError, Result};
pub use types::{ReportedError, WebhookReply};
