//! Data model shared by every part of the worker.
//!
//! Identities are cheap value types used as map keys and channel
//! endpoints. Nothing in here has behavior beyond construction and
//! display.

use std::fmt;
use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

pub mod messages;
pub mod tuple;

/// Reserved sender used to kick off source operators that have no
/// real upstream.
pub const SOURCE_STARTER: &str = "SOURCE_STARTER";

/// Identity of the controller participant.
pub const CONTROLLER: &str = "CONTROLLER";

/// Opaque name of a worker or controller.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorVirtualIdentity(pub String);

impl ActorVirtualIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn controller() -> Self {
        Self::new(CONTROLLER)
    }

    pub fn source_starter() -> Self {
        Self::new(SOURCE_STARTER)
    }

    pub fn is_source_starter(&self) -> bool {
        self.0 == SOURCE_STARTER
    }
}

impl Display for ActorVirtualIdentity {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl From<&str> for ActorVirtualIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A logical point-to-point channel. A channel carries either control
/// or data traffic, never both.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelIdentity {
    pub from: ActorVirtualIdentity,
    pub to: ActorVirtualIdentity,
    pub is_control: bool,
}

impl ChannelIdentity {
    pub fn new(
        from: impl Into<ActorVirtualIdentity>,
        to: impl Into<ActorVirtualIdentity>,
        is_control: bool,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            is_control,
        }
    }

    pub fn data(from: impl Into<ActorVirtualIdentity>, to: impl Into<ActorVirtualIdentity>) -> Self {
        Self::new(from, to, false)
    }

    pub fn control(
        from: impl Into<ActorVirtualIdentity>,
        to: impl Into<ActorVirtualIdentity>,
    ) -> Self {
        Self::new(from, to, true)
    }
}

impl Display for ChannelIdentity {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let kind = if self.is_control { "control" } else { "data" };
        write!(fmt, "{}->{} ({kind})", self.from, self.to)
    }
}

/// A logical input or output port of an operator.
#[derive(
    Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PortIdentity {
    pub id: u32,
    pub internal: bool,
}

impl PortIdentity {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            internal: false,
        }
    }

    /// Index handed to operator logic.
    pub fn index(&self) -> usize {
        self.id as usize
    }
}

impl Display for PortIdentity {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.internal {
            write!(fmt, "port-{}-internal", self.id)
        } else {
            write!(fmt, "port-{}", self.id)
        }
    }
}

/// A downstream link between an output port of one operator and an
/// input port of another.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalLink {
    pub from_op: String,
    pub from_port: PortIdentity,
    pub to_op: String,
    pub to_port: PortIdentity,
}

impl Display for PhysicalLink {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}[{}]->{}[{}]",
            self.from_op, self.from_port, self.to_op, self.to_port
        )
    }
}

/// Lifecycle of a worker.
///
/// See [`WorkerState::transitions`] for the allowed edges.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Uninitialized,
    Ready,
    Paused,
    Running,
    Completed,
}

impl WorkerState {
    /// The fixed transition graph of a worker.
    pub fn transitions() -> Vec<(WorkerState, Vec<WorkerState>)> {
        use WorkerState::*;
        vec![
            (Uninitialized, vec![Ready]),
            (Ready, vec![Paused, Running]),
            (Running, vec![Paused, Completed]),
            (Paused, vec![Running]),
            (Completed, vec![]),
        ]
    }
}

impl Display for WorkerState {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, fmt)
    }
}

/// Independent reasons for a worker to be paused.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PauseType {
    UserPause,
    BackpressurePause,
    SchedulerTimeSlotExpiredPause,
    ExceptionPause,
    DebugPause,
}

/// Internal signals interleaved with the record stream.
///
/// These never cross the wire as tuples. They are produced by the
/// [`crate::inputs::InputManager`] and consumed by the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalMarker {
    /// The active input channel changed.
    SenderChange(ChannelIdentity),
    StartOfInputPort(PortIdentity),
    EndOfInputPort(PortIdentity),
    StartOfOutputPorts,
    EndOfOutputPorts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{assert_tokens, Token};

    #[test]
    fn worker_state_serializes_screaming() {
        assert_tokens(
            &WorkerState::Running,
            &[Token::UnitVariant {
                name: "WorkerState",
                variant: "RUNNING",
            }],
        );
    }

    #[test]
    fn port_identity_tokens() {
        assert_tokens(
            &PortIdentity::new(3),
            &[
                Token::Struct {
                    name: "PortIdentity",
                    len: 2,
                },
                Token::Str("id"),
                Token::U32(3),
                Token::Str("internal"),
                Token::Bool(false),
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn channel_display() {
        let channel = ChannelIdentity::data("a", "b");
        assert_eq!(channel.to_string(), "a->b (data)");
    }
}
