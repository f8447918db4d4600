//! Control plane calls between participants.
//!
//! The client side turns an outbound request into a
//! [`ControlInvocation`](crate::model::messages::ControlInvocation)
//! and later matches the reply to it. The server side dispatches
//! inbound invocations to handler functions and always answers with
//! either a value or a structured error.

mod client;
mod server;

pub use client::{AsyncRpcClient, ReplyHandle};
pub use server::{AsyncRpcServer, Handler};
