use std::collections::HashMap;
use std::time::SystemTime;

use crate::association::associator::Association;
use crate::publishing::event_bus::EventBus;
use crate::reporting::domain::change_event::ChangeEvent;
use crate::reporting::domain::identity_state::IdentityState;
use crate::reporting::infrastructure::directory_dispatcher::{DirectoryDispatcher, DirectoryRequest};

/// Tracks the last known state of every identity and reports changes.
///
/// Repeating an unchanged association is a no-op: no event, no directory
/// update. Local state is updated before the directory is asked, and a
/// failed delivery never rolls it back.
pub struct StateReporter {
    states: HashMap<String, IdentityState>,
    bus: EventBus,
    directory: DirectoryDispatcher,
}

impl StateReporter {
    pub fn new(bus: EventBus, directory: DirectoryDispatcher) -> Self {
        Self {
            states: HashMap::new(),
            bus,
            directory,
        }
    }

    /// Apply one frame's associations. Returns the events that were published.
    ///
    /// Several faces resolving to one name within a frame count as a single
    /// sighting, equipped if any of them is.
    pub fn report(&mut self, associations: &[Association], now: SystemTime) -> Vec<ChangeEvent> {
        let mut events = Vec::new();

        for a in collapse_by_name(associations) {
            if !self.states.contains_key(&a.name) {
                log::info!("First sighting of {}", a.name);
                self.states
                    .insert(a.name.clone(), IdentityState::first_seen(a.name.clone(), now));
                events.push(ChangeEvent::IdentityAppeared {
                    name: a.name.clone(),
                });
                self.directory.dispatch(DirectoryRequest::RegisterIdentity {
                    name: a.name.clone(),
                });
            }
            let Some(state) = self.states.get_mut(&a.name) else {
                continue;
            };
            state.last_seen = now;

            if state.equipped != a.equipped {
                state.equipped = a.equipped;
                log::info!("{} equipped: {}", a.name, a.equipped);
                events.push(ChangeEvent::EquipmentChanged {
                    name: a.name.clone(),
                    equipped: a.equipped,
                });
                self.directory.dispatch(DirectoryRequest::SetEquipped {
                    name: a.name.clone(),
                    equipped: a.equipped,
                });
            }
        }

        for event in &events {
            self.bus.publish(event);
        }
        events
    }

    pub fn state(&self, name: &str) -> Option<&IdentityState> {
        self.states.get(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &IdentityState> {
        self.states.values()
    }

    /// Flush pending directory updates and stop the directory worker.
    pub fn shutdown(&mut self) {
        self.directory.shutdown();
    }
}

/// One entry per name in first-seen order, equipped if any entry was.
fn collapse_by_name(associations: &[Association]) -> Vec<Association> {
    let mut collapsed: Vec<Association> = Vec::with_capacity(associations.len());
    for a in associations {
        match collapsed.iter_mut().find(|c| c.name == a.name) {
            Some(existing) => {
                if a.equipped && !existing.equipped {
                    existing.equipped = true;
                    existing.equipment = a.equipment;
                }
            }
            None => collapsed.push(a.clone()),
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::reporting::infrastructure::directory_dispatcher::tests::RecordingClient;
    use crate::reporting::infrastructure::directory_dispatcher::DispatchPolicy;

    fn policy() -> DispatchPolicy {
        DispatchPolicy {
            capacity: 1024,
            attempts: 1,
            retry_delay: Duration::from_millis(1),
            ..DispatchPolicy::default()
        }
    }

    fn reporter_with(client: Arc<RecordingClient>) -> (StateReporter, EventBus) {
        let bus = EventBus::new();
        let reporter = StateReporter::new(bus.clone(), DirectoryDispatcher::spawn(client, policy()));
        (reporter, bus)
    }

    fn seen(name: &str, equipped: bool) -> Association {
        Association {
            name: name.into(),
            equipped,
            equipment: None,
        }
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_no_associations_no_events() {
        let client = Arc::new(RecordingClient::default());
        let (mut reporter, bus) = reporter_with(client.clone());
        let sub = bus.subscribe();

        assert!(reporter.report(&[], at(1)).is_empty());
        reporter.shutdown();

        assert!(sub.drain().is_empty());
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_first_sighting_unequipped_appears_only() {
        let client = Arc::new(RecordingClient::default());
        let (mut reporter, _bus) = reporter_with(client.clone());

        let events = reporter.report(&[seen("bob", false)], at(1));
        reporter.shutdown();

        assert_eq!(events, vec![ChangeEvent::IdentityAppeared { name: "bob".into() }]);
        assert_eq!(
            client.calls(),
            vec![DirectoryRequest::RegisterIdentity { name: "bob".into() }]
        );
    }

    #[test]
    fn test_unchanged_state_is_silent_across_many_frames() {
        let client = Arc::new(RecordingClient::default());
        let (mut reporter, bus) = reporter_with(client.clone());
        let sub = bus.subscribe();

        reporter.report(&[seen("bob", true)], at(0));
        let first = sub.drain();
        assert_eq!(first.len(), 2);

        for i in 1..=150 {
            assert!(reporter.report(&[seen("bob", true)], at(i)).is_empty());
        }
        reporter.shutdown();

        assert!(sub.drain().is_empty());
        assert_eq!(client.calls().len(), 2);
        assert_eq!(reporter.state("bob").unwrap().last_seen, at(150));
    }

    #[test]
    fn test_bob_puts_on_and_takes_off_hardhat() {
        let client = Arc::new(RecordingClient::default());
        let (mut reporter, bus) = reporter_with(client.clone());
        let sub = bus.subscribe();

        reporter.report(&[seen("bob", true)], at(1));
        reporter.report(&[seen("bob", true)], at(2));
        reporter.report(&[seen("bob", false)], at(3));
        reporter.report(&[seen("bob", false)], at(4));
        reporter.shutdown();

        assert_eq!(
            sub.drain(),
            vec![
                ChangeEvent::IdentityAppeared { name: "bob".into() },
                ChangeEvent::EquipmentChanged {
                    name: "bob".into(),
                    equipped: true
                },
                ChangeEvent::EquipmentChanged {
                    name: "bob".into(),
                    equipped: false
                },
            ]
        );
        assert_eq!(
            client.calls(),
            vec![
                DirectoryRequest::RegisterIdentity { name: "bob".into() },
                DirectoryRequest::SetEquipped {
                    name: "bob".into(),
                    equipped: true
                },
                DirectoryRequest::SetEquipped {
                    name: "bob".into(),
                    equipped: false
                },
            ]
        );
    }

    #[test]
    fn test_directory_failure_keeps_local_state() {
        let client = Arc::new(RecordingClient::failing(usize::MAX));
        let (mut reporter, _bus) = reporter_with(client.clone());

        reporter.report(&[seen("bob", true)], at(1));
        let again = reporter.report(&[seen("bob", true)], at(2));
        reporter.shutdown();

        assert!(again.is_empty());
        assert!(reporter.state("bob").unwrap().equipped);
        assert_eq!(client.calls().len(), 2);
    }

    #[test]
    fn test_identities_are_tracked_independently() {
        let client = Arc::new(RecordingClient::default());
        let (mut reporter, _bus) = reporter_with(client);

        reporter.report(&[seen("alice", false), seen("bob", true)], at(1));
        let events = reporter.report(&[seen("alice", true), seen("bob", true)], at(2));

        assert_eq!(
            events,
            vec![ChangeEvent::EquipmentChanged {
                name: "alice".into(),
                equipped: true
            }]
        );
        assert_eq!(reporter.states().count(), 2);
    }

    #[test]
    fn test_same_name_twice_in_a_frame_does_not_flap() {
        let client = Arc::new(RecordingClient::default());
        let (mut reporter, bus) = reporter_with(client.clone());
        let sub = bus.subscribe();
        let frame = [seen("bob", true), seen("bob", false)];

        reporter.report(&frame, at(0));
        assert_eq!(
            sub.drain(),
            vec![
                ChangeEvent::IdentityAppeared { name: "bob".into() },
                ChangeEvent::EquipmentChanged {
                    name: "bob".into(),
                    equipped: true
                },
            ]
        );

        for i in 1..=100 {
            assert!(reporter.report(&frame, at(i)).is_empty());
        }
        reporter.shutdown();

        assert!(sub.drain().is_empty());
        assert_eq!(client.calls().len(), 2);
        assert!(reporter.state("bob").unwrap().equipped);
    }

    #[test]
    fn test_collapse_keeps_first_seen_order() {
        let collapsed = collapse_by_name(&[
            seen("carol", false),
            seen("bob", false),
            seen("carol", true),
        ]);

        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].name, "carol");
        assert!(collapsed[0].equipped);
        assert!(!collapsed[1].equipped);
    }
}
