//! The resilient Pub/Sub Client and the raw transports it is layered over.

mod client;
mod transport;

pub use client::PubSubClient;
