//! Architectural Contract Test: Exactly-Once Notification
//!
//! This test verifies that every observable change produces EXACTLY ONE
//! event per affected object, and that no-op updates produce none.
//!
//! Constraints verified:
//! - One state change → one link event and at most one manager event
//! - Writing an unchanged value emits nothing
//! - A batched update emits a single event naming every changed property
//! - Events carry the new values and the object's resource path
//!
//! If this test fails, someone has added:
//! - Unconditional notification on every write
//! - Per-field notification inside batched updates
//! - Notification from inside the registry lock that was reordered

mod common;

use linkd_core::link::{AddressState, CarrierState, OperationalState, Property, StateUpdate};
use std::collections::BTreeMap;
use tokio_test::{assert_err, assert_ok};
use common::*;

fn changed(pairs: &[(Property, &str)]) -> BTreeMap<Property, String> {
    pairs
        .iter()
        .map(|(p, v)| (*p, (*v).to_string()))
        .collect()
}

#[test]
fn operational_change_notifies_link_and_manager_once() {
    let (registry, observer) = observed_registry();
    assert_ok!(registry.insert(2, "eth0"));
    observer.clear();

    assert_ok!(registry.update_state(2, StateUpdate::Operational(OperationalState::Routable)));

    let link_events = observer.link_events(2);
    assert_eq!(link_events.len(), 1, "exactly one link event");
    assert_eq!(link_events[0].path, "/org/freedesktop/network1/link/2");
    assert_eq!(
        link_events[0].changed,
        changed(&[(Property::OperationalState, "routable")])
    );

    let manager_events = observer.manager_events();
    assert_eq!(manager_events.len(), 1, "exactly one manager event");
    assert_eq!(manager_events[0].path, "/org/freedesktop/network1");
    assert_eq!(
        manager_events[0].changed,
        changed(&[(Property::OperationalState, "routable")])
    );
}

#[test]
fn unchanged_value_emits_nothing() {
    let (registry, observer) = observed_registry();
    assert_ok!(registry.insert(2, "eth0"));
    assert_ok!(registry.update_state(2, StateUpdate::Carrier(CarrierState::Carrier)));
    observer.clear();

    assert_ok!(registry.update_state(2, StateUpdate::Carrier(CarrierState::Carrier)));
    assert_ok!(registry.update_state(2, StateUpdate::Address(AddressState::Off)));

    assert!(observer.events().is_empty(), "no-op writes must be silent");
}

#[test]
fn batched_update_emits_single_link_event() {
    let (registry, observer) = observed_registry();
    assert_ok!(registry.insert(3, "wlan0"));
    observer.clear();

    let result = registry.apply(
        3,
        &[
            StateUpdate::Carrier(CarrierState::Carrier),
            StateUpdate::Address(AddressState::Routable),
            StateUpdate::Operational(OperationalState::Routable),
        ],
    );
    let properties = assert_ok!(result);
    assert_eq!(properties.len(), 3);

    let link_events = observer.link_events(3);
    assert_eq!(link_events.len(), 1);
    assert_eq!(
        link_events[0].changed,
        changed(&[
            (Property::OperationalState, "routable"),
            (Property::CarrierState, "carrier"),
            (Property::AddressState, "routable"),
        ])
    );
    assert_eq!(observer.manager_events().len(), 1);
}

#[test]
fn link_change_without_summary_change_skips_manager() {
    let (registry, observer) = observed_registry();
    assert_ok!(registry.insert(2, "eth0"));
    assert_ok!(registry.insert(3, "wlan0"));
    observer.clear();

    // Worst case stays at off while wlan0 is off
    assert_ok!(registry.update_state(2, StateUpdate::Operational(OperationalState::Routable)));

    assert_eq!(observer.link_events(2).len(), 1);
    assert!(observer.manager_events().is_empty());
}

#[test]
fn membership_changes_notify_manager_only_when_summary_moves() {
    let (registry, observer) = observed_registry();

    // Off → off: nothing observable
    assert_ok!(registry.insert(2, "eth0"));
    assert!(observer.events().is_empty());

    assert_ok!(registry.update_state(2, StateUpdate::Carrier(CarrierState::Carrier)));
    observer.clear();

    // A new off link drags the worst case down
    assert_ok!(registry.insert(3, "wlan0"));
    let events = observer.manager_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].changed, changed(&[(Property::CarrierState, "off")]));
    observer.clear();

    // Removing it lifts the summary again
    assert_ok!(registry.remove(3));
    let events = observer.manager_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].changed, changed(&[(Property::CarrierState, "carrier")]));
    assert!(observer.link_events(3).is_empty());
}

#[test]
fn unmanaged_links_do_not_drive_the_summary() {
    let (registry, observer) = observed_registry();
    assert_ok!(registry.insert(1, "lo"));
    assert_ok!(registry.set_managed(1, false));
    observer.clear();

    assert_ok!(registry.update_state(1, StateUpdate::Operational(OperationalState::Carrier)));

    assert_eq!(observer.link_events(1).len(), 1);
    assert!(observer.manager_events().is_empty());
    assert_eq!(registry.summary().operational_state, OperationalState::Off);
}

#[test]
fn failed_mutation_emits_nothing() {
    let (registry, observer) = observed_registry();
    assert_ok!(registry.insert(2, "eth0"));
    observer.clear();

    assert_err!(registry.insert(2, "eth1"));
    assert_err!(registry.update_state(9, StateUpdate::Carrier(CarrierState::Carrier)));
    assert_err!(registry.remove(9));

    assert!(observer.events().is_empty());
}
