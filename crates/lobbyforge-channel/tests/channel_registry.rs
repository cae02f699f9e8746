//! Integration tests for channel membership and broadcast.

use std::sync::Arc;

use lobbyforge_channel::{ChannelConfig, ChannelError, ChannelRegistry};
use lobbyforge_protocol::{FrameReader, Privileges, UserId};
use lobbyforge_session::{Delivery, Session, SessionDirectory, UserIdentity};

// =========================================================================
// Helpers
// =========================================================================

fn session(id: i32, privileges: Privileges) -> Arc<Session> {
    Session::new(
        UserIdentity::new(UserId(id), format!("user{id}"), privileges),
        Delivery::polled(),
    )
}

fn packet_ids(session: &Session) -> Vec<u16> {
    let bytes = session.dequeue();
    FrameReader::new(&bytes)
        .map(|f| f.expect("valid frame").packet_id)
        .collect()
}

fn setup() -> (Arc<SessionDirectory>, ChannelRegistry) {
    let directory = Arc::new(SessionDirectory::new());
    let mut staff = ChannelConfig::new("#staff", "staff only");
    staff.public_read = false;
    staff.public_write = false;
    let registry = ChannelRegistry::with_channels(
        Arc::clone(&directory),
        &[ChannelConfig::new("#osu", "main"), staff],
    );
    (directory, registry)
}

fn online(directory: &SessionDirectory, id: i32, privileges: Privileges) -> Arc<Session> {
    let s = session(id, privileges);
    assert!(directory.register(Arc::clone(&s)));
    s
}

// =========================================================================
// join()
// =========================================================================

#[test]
fn test_join_permanent_channel_broadcasts_to_everyone() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    let bystander = online(&directory, 2, Privileges::NORMAL);

    assert!(registry.join_by_name("#osu", &alice).unwrap());

    // join success + channel info for the joiner
    assert_eq!(packet_ids(&alice), vec![64, 65]);
    // the bystander isn't a member but still sees the new member count
    assert_eq!(packet_ids(&bystander), vec![65]);
}

#[test]
fn test_join_twice_reacknowledges_without_duplicate_membership() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    let osu = registry.get("#osu").unwrap();

    assert!(registry.join(&osu, &alice));
    alice.dequeue();
    assert!(registry.join(&osu, &alice));

    assert_eq!(osu.member_count(), 1);
    assert_eq!(packet_ids(&alice), vec![64]);
}

#[test]
fn test_join_private_channel_unprivileged_is_refused_silently() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::DONOR);
    let watcher = online(&directory, 2, Privileges::NORMAL);
    let staff = registry.get("#staff").unwrap();

    assert!(!registry.join(&staff, &alice));

    assert_eq!(staff.member_count(), 0);
    assert!(packet_ids(&alice).is_empty());
    assert!(packet_ids(&watcher).is_empty());
}

#[test]
fn test_join_private_channel_as_chat_mod_succeeds() {
    let (directory, registry) = setup();
    let moderator = online(&directory, 1, Privileges::CHAT_MOD);
    let player = online(&directory, 2, Privileges::NORMAL);
    let staff = registry.get("#staff").unwrap();

    assert!(registry.join(&staff, &moderator));
    assert_eq!(staff.member_count(), 1);
    // players can't read the channel, so they don't get its descriptor
    assert!(packet_ids(&player).is_empty());
}

#[test]
fn test_join_unknown_channel_is_error() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    assert!(matches!(
        registry.join_by_name("#nowhere", &alice),
        Err(ChannelError::UnknownChannel(name)) if name == "#nowhere"
    ));
}

// =========================================================================
// temporary channels
// =========================================================================

#[test]
fn test_temporary_channel_broadcast_stays_with_members() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    let outsider = online(&directory, 2, Privileges::NORMAL);
    let multi = registry.create_temporary("#multi_1", "Channel for #multi_1");

    assert!(registry.join(&multi, &alice));
    assert_eq!(packet_ids(&alice), vec![64, 65]);
    assert!(packet_ids(&outsider).is_empty());
}

#[test]
fn test_last_leave_deletes_temporary_channel() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    let bob = online(&directory, 2, Privileges::NORMAL);
    let multi = registry.create_temporary("#multi_1", "Channel for #multi_1");
    registry.join(&multi, &alice);
    registry.join(&multi, &bob);

    assert!(registry.leave(&multi, &alice));
    assert!(registry.get("#multi_1").is_some());
    assert!(registry.leave(&multi, &bob));
    assert!(registry.get("#multi_1").is_none());
}

#[test]
fn test_last_leave_keeps_permanent_channel() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    registry.join_by_name("#osu", &alice).unwrap();
    assert!(registry.leave_by_name("#osu", &alice).unwrap());
    assert!(registry.get("#osu").is_some());
}

#[test]
fn test_leave_non_member_returns_false() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    assert!(!registry.leave_by_name("#osu", &alice).unwrap());
    assert!(packet_ids(&alice).is_empty());
}

#[test]
fn test_leave_all_parts_every_channel() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    let multi = registry.create_temporary("#multi_9", "Channel for #multi_9");
    registry.join_by_name("#osu", &alice).unwrap();
    registry.join(&multi, &alice);

    let mut left = registry.leave_all(&alice);
    left.sort();
    assert_eq!(left, vec!["#multi_9".to_string(), "#osu".to_string()]);
    assert!(registry.get("#multi_9").is_none());
}

// =========================================================================
// snapshots
// =========================================================================

#[test]
fn test_descriptors_sorted_with_counts() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    registry.join_by_name("#osu", &alice).unwrap();

    let descriptors = registry.descriptors();
    let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["#osu", "#staff"]);
    assert_eq!(descriptors[0].member_count, 1);
    assert!(!descriptors[1].public_read);
}

#[test]
fn test_listing_hides_private_channels_from_players() {
    let (directory, registry) = setup();
    let alice = online(&directory, 1, Privileges::NORMAL);
    let listing = registry.listing_for(&alice);
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name(), "#osu");
}
