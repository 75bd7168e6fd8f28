//! Provider specific [`ClientWrapper`](crate::deliberation::client_wrapper::ClientWrapper)
//! implementations.

pub mod common;

pub mod openai;
