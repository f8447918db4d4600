//! Alignment of embedded control messages across input channels.
//!
//! An embedded control message travels down every data channel like a
//! barrier. It only takes effect once it has been seen on the channels
//! its [`AlignmentPolicy`] requires, and it takes effect at most once
//! per message id.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::errors::{WorkerError, WorkerResult};
use crate::inputs::InputManager;
use crate::model::messages::{AlignmentPolicy, EmbeddedControlMessage, EmbeddedControlMessageIdentity};
use crate::model::{ActorVirtualIdentity, ChannelIdentity};

#[derive(Debug)]
pub struct AlignmentManager {
    worker_id: ActorVirtualIdentity,
    seen: HashMap<EmbeddedControlMessageIdentity, HashSet<ChannelIdentity>>,
}

impl AlignmentManager {
    pub fn new(worker_id: ActorVirtualIdentity) -> Self {
        Self {
            worker_id,
            seen: HashMap::new(),
        }
    }

    /// Channels a message has to be seen on before it is fully aligned.
    ///
    /// This is the message's scope restricted to data channels into
    /// this worker or, if that leaves nothing, every data channel
    /// registered with `inputs`.
    fn scope(
        &self,
        inputs: &InputManager,
        marker: &EmbeddedControlMessage,
    ) -> HashSet<ChannelIdentity> {
        let scope: HashSet<_> = marker
            .scope
            .iter()
            .filter(|channel| !channel.is_control && channel.to == self.worker_id)
            .cloned()
            .collect();
        if scope.is_empty() {
            inputs.data_channels().into_iter().collect()
        } else {
            scope
        }
    }

    /// Record that `marker` arrived on `from` and report whether it
    /// should take effect now.
    pub fn is_aligned(
        &mut self,
        inputs: &InputManager,
        from: &ChannelIdentity,
        marker: &EmbeddedControlMessage,
    ) -> WorkerResult<bool> {
        let scope = self.scope(inputs, marker);
        let seen = self.seen.entry(marker.id.clone()).or_default();
        seen.insert(from.clone());

        let arrived = match marker.alignment {
            AlignmentPolicy::AllAlignment | AlignmentPolicy::RequireAlignment => {
                seen.is_superset(&scope)
            }
            AlignmentPolicy::PortAlignment => match inputs.get_port_id(from) {
                Some(port_id) => inputs
                    .port_channels(&port_id)
                    .iter()
                    .all(|channel| seen.contains(channel)),
                None => seen.is_superset(&scope),
            },
            AlignmentPolicy::NoAlignment => seen.len() == 1,
            AlignmentPolicy::Unsupported => {
                self.seen.remove(&marker.id);
                return Err(WorkerError::UnsupportedMarkerType(format!(
                    "{:?}",
                    marker.alignment
                )));
            }
        };

        if seen.is_superset(&scope) {
            tracing::debug!(
                "embedded control message {:?} fully aligned on {}",
                marker.id,
                self.worker_id
            );
            self.seen.remove(&marker.id);
        }
        Ok(arrived)
    }

    /// Number of messages still waiting for some channel.
    pub fn in_flight(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tuple::Schema;
    use crate::model::PortIdentity;

    /// Three upstream channels: `a` and `b` on port 0, `c` on port 1.
    fn inputs() -> (InputManager, Vec<ChannelIdentity>) {
        let mut inputs = InputManager::new("me".into());
        inputs.add_input_port(PortIdentity::new(0), Schema::default());
        inputs.add_input_port(PortIdentity::new(1), Schema::default());
        let channels: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|from| ChannelIdentity::data(*from, "me"))
            .collect();
        inputs
            .register_input(channels[0].clone(), PortIdentity::new(0))
            .unwrap();
        inputs
            .register_input(channels[1].clone(), PortIdentity::new(0))
            .unwrap();
        inputs
            .register_input(channels[2].clone(), PortIdentity::new(1))
            .unwrap();
        (inputs, channels)
    }

    fn marker(alignment: AlignmentPolicy, scope: Vec<ChannelIdentity>) -> EmbeddedControlMessage {
        EmbeddedControlMessage {
            id: EmbeddedControlMessageIdentity("m1".to_owned()),
            alignment,
            scope,
            command_mapping: HashMap::new(),
        }
    }

    #[test]
    fn all_alignment_arrives_exactly_once_in_any_order() {
        let (inputs, mut channels) = inputs();
        let rng = fastrand::Rng::new();
        for _ in 0..10 {
            rng.shuffle(&mut channels);
            let mut manager = AlignmentManager::new("me".into());
            let m = marker(AlignmentPolicy::AllAlignment, channels.clone());

            let found: Vec<bool> = channels
                .iter()
                .map(|channel| manager.is_aligned(&inputs, channel, &m).unwrap())
                .collect();
            assert_eq!(found, vec![false, false, true]);
            assert_eq!(manager.in_flight(), 0);

            // Behaves as a brand new marker afterwards.
            assert!(!manager.is_aligned(&inputs, &channels[0], &m).unwrap());
            assert_eq!(manager.in_flight(), 1);
        }
    }

    #[test]
    fn empty_scope_means_every_data_channel() {
        let (inputs, channels) = inputs();
        let mut manager = AlignmentManager::new("me".into());
        let m = marker(AlignmentPolicy::RequireAlignment, Vec::new());
        assert!(!manager.is_aligned(&inputs, &channels[0], &m).unwrap());
        assert!(!manager.is_aligned(&inputs, &channels[1], &m).unwrap());
        assert!(manager.is_aligned(&inputs, &channels[2], &m).unwrap());
    }

    #[test]
    fn scope_ignores_channels_into_other_workers() {
        let (inputs, channels) = inputs();
        let mut manager = AlignmentManager::new("me".into());
        let scope = vec![channels[0].clone(), ChannelIdentity::data("a", "someone-else")];
        let m = marker(AlignmentPolicy::AllAlignment, scope);
        assert!(manager.is_aligned(&inputs, &channels[0], &m).unwrap());
    }

    #[test]
    fn no_alignment_triggers_once() {
        let (inputs, channels) = inputs();
        let mut manager = AlignmentManager::new("me".into());
        let m = marker(AlignmentPolicy::NoAlignment, channels.clone());
        let found: Vec<bool> = channels
            .iter()
            .map(|channel| manager.is_aligned(&inputs, channel, &m).unwrap())
            .collect();
        assert_eq!(found, vec![true, false, false]);
        assert_eq!(manager.in_flight(), 0);
    }

    #[test]
    fn port_alignment_waits_for_own_port_only() {
        let (inputs, channels) = inputs();
        let mut manager = AlignmentManager::new("me".into());
        let m = marker(AlignmentPolicy::PortAlignment, channels.clone());
        assert!(manager.is_aligned(&inputs, &channels[2], &m).unwrap());
        assert!(!manager.is_aligned(&inputs, &channels[0], &m).unwrap());
        assert!(manager.is_aligned(&inputs, &channels[1], &m).unwrap());
        assert_eq!(manager.in_flight(), 0);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let (inputs, channels) = inputs();
        let mut manager = AlignmentManager::new("me".into());
        let m = marker(AlignmentPolicy::Unsupported, channels.clone());
        assert!(matches!(
            manager.is_aligned(&inputs, &channels[0], &m),
            Err(WorkerError::UnsupportedMarkerType(_))
        ));
        assert_eq!(manager.in_flight(), 0);
    }
}
