use std::{cell::RefCell, rc::Rc};

use meshroom::{
    peer::{NegotiationRole, NegotiationState},
    platform::MediaKind,
};
use meshroom_signalling_proto::{MessageKind, Participant, UserId};

use crate::{join, relay::Relay, settle, Client};

type ReceivedTracks = Rc<RefCell<Vec<(UserId, MediaKind)>>>;

fn record_remote_tracks(client: &Client) -> ReceivedTracks {
    let received = Rc::new(RefCell::new(Vec::new()));
    let received_clone = Rc::clone(&received);
    client.room.on_remote_track(move |id, track| {
        received_clone.borrow_mut().push((id, track.kind()));
    });
    received
}

fn state_with(client: &Client, remote: &str) -> Option<NegotiationState> {
    client.room.peers().get(&remote.into()).map(|p| p.state())
}

fn member(client: &Client, id: &str) -> Participant {
    client
        .room
        .participants()
        .into_iter()
        .find(|p| p.id.0 == id)
        .unwrap()
}

async fn connected_pair(relay: &Rc<Relay>) -> (Client, Client) {
    let a = Client::new(relay, "u1");
    let b = Client::new(relay, "u2");
    join(&a, "Alice", &[]).await;
    join(&b, "Bob", &[&a]).await;
    (a, b)
}

#[tokio::test]
async fn newcomer_is_offered_sessions() {
    let relay = Rc::new(Relay::default());
    let a = Client::new(&relay, "u1");
    let b = Client::new(&relay, "u2");
    let at_a = record_remote_tracks(&a);
    let at_b = record_remote_tracks(&b);

    join(&a, "Alice", &[]).await;
    join(&b, "Bob", &[&a]).await;

    let peer = a.room.peers().get(&"u2".into()).unwrap();
    assert_eq!(peer.role(), NegotiationRole::Offerer);
    assert_eq!(peer.state(), NegotiationState::Connected);
    let peer = b.room.peers().get(&"u1".into()).unwrap();
    assert_eq!(peer.role(), NegotiationRole::Answerer);
    assert_eq!(peer.state(), NegotiationState::Connected);

    let mut at_a = at_a.borrow().clone();
    at_a.sort_by_key(|(_, kind)| kind.to_string());
    assert_eq!(
        at_a,
        [
            (UserId::from("u2"), MediaKind::Audio),
            (UserId::from("u2"), MediaKind::Video),
        ],
    );
    assert_eq!(at_b.borrow().len(), 2);

    assert_eq!(a.transports.last().remote_candidates.borrow().len(), 1);
    assert_eq!(b.transports.last().remote_candidates.borrow().len(), 1);
    assert!(a.errors.borrow().is_empty());
    assert!(b.errors.borrow().is_empty());
}

#[tokio::test]
async fn every_pair_of_three_members_is_connected() {
    let relay = Rc::new(Relay::default());
    let a = Client::new(&relay, "u1");
    let b = Client::new(&relay, "u2");
    let c = Client::new(&relay, "u3");

    join(&a, "Alice", &[]).await;
    join(&b, "Bob", &[&a]).await;
    join(&c, "Carol", &[&a, &b]).await;

    for (client, others) in
        &[(&a, ["u2", "u3"]), (&b, ["u1", "u3"]), (&c, ["u1", "u2"])]
    {
        assert_eq!(client.room.peers().len(), 2);
        for other in others {
            assert_eq!(
                state_with(client, other),
                Some(NegotiationState::Connected),
            );
        }
    }
    for peer in c.room.peers().get_all() {
        assert_eq!(peer.role(), NegotiationRole::Answerer);
    }
    assert_eq!(a.transports.created.borrow().len(), 2);
}

#[tokio::test]
async fn muting_keeps_session_untouched() {
    let relay = Rc::new(Relay::default());
    let (a, b) = connected_pair(&relay).await;

    assert!(!a.room.toggle_audio().await.unwrap());
    settle(&[&a, &b]).await;

    let transport = a.transports.last();
    assert_eq!(transport.offers_made(), 1);
    assert!(transport.replaced.borrow().is_empty());
    assert_eq!(state_with(&a, "u2"), Some(NegotiationState::Connected));
    assert!(!member(&b, "u1").media.audio_enabled);
}

#[tokio::test]
async fn camera_toggle_replaces_track_in_place() {
    let relay = Rc::new(Relay::default());
    let (a, b) = connected_pair(&relay).await;
    let at_b = record_remote_tracks(&b);
    let transport = a.transports.last();

    assert!(!a.room.toggle_video().await.unwrap());
    settle(&[&a, &b]).await;

    assert_eq!(transport.sending(MediaKind::Video), None);
    assert!(!member(&b, "u1").media.video_enabled);

    assert!(a.room.toggle_video().await.unwrap());
    settle(&[&a, &b]).await;

    assert_eq!(
        *transport.replaced.borrow(),
        [
            (MediaKind::Video, None),
            (MediaKind::Video, Some("u1-cam-3".into())),
        ],
    );
    assert_eq!(transport.offers_made(), 1);
    assert_eq!(state_with(&a, "u2"), Some(NegotiationState::Connected));
    assert_eq!(state_with(&b, "u1"), Some(NegotiationState::Connected));
    assert!(member(&b, "u1").media.video_enabled);
    assert!(at_b.borrow().is_empty());
}

#[tokio::test]
async fn screen_share_substitutes_camera() {
    let relay = Rc::new(Relay::default());
    let (a, b) = connected_pair(&relay).await;
    let transport = a.transports.last();

    assert!(a.room.toggle_screen_share().await.unwrap());
    settle(&[&a, &b]).await;

    assert_eq!(
        transport.sending(MediaKind::Video).as_deref(),
        Some("u1-screen-3"),
    );
    assert!(member(&b, "u1").media.screen_sharing);

    assert!(!a.room.toggle_screen_share().await.unwrap());
    settle(&[&a, &b]).await;

    assert_eq!(
        transport.sending(MediaKind::Video).as_deref(),
        Some("u1-cam-2"),
    );
    assert!(!member(&b, "u1").media.screen_sharing);
    assert_eq!(transport.offers_made(), 1);
}

#[tokio::test]
async fn member_leaving_mid_negotiation_is_forgotten() {
    let relay = Rc::new(Relay::default());
    let a = Client::new(&relay, "u1");
    let b = Client::new(&relay, "u2");
    join(&a, "Alice", &[]).await;
    let only_b = [&b];
    let (res, ()) = futures::join!(
        b.room.join("R1".into(), "Bob".into(), None),
        settle(&only_b),
    );
    res.unwrap();
    settle(&[&a]).await;
    assert_eq!(state_with(&a, "u2"), Some(NegotiationState::Negotiating));

    b.room.leave();
    settle(&[&a, &b]).await;

    assert!(a.room.peers().is_empty());
    assert!(a.room.participants().is_empty());
    assert!(a.transports.last().closed.get());
    assert!(b.room.peers().is_empty());
    assert!(b.transports.created.borrow().is_empty());
    assert!(a.errors.borrow().is_empty());
    assert!(b.errors.borrow().is_empty());
}

#[tokio::test]
async fn leaving_twice_notifies_others_once() {
    let relay = Rc::new(Relay::default());
    let (a, b) = connected_pair(&relay).await;
    let left = Rc::new(RefCell::new(Vec::new()));
    let left_clone = Rc::clone(&left);
    b.room
        .on_participant_left(move |id| left_clone.borrow_mut().push(id));

    a.room.leave();
    a.room.leave();
    settle(&[&a, &b]).await;

    assert_eq!(*left.borrow(), [UserId::from("u1")]);
    assert!(b.room.peers().is_empty());
    assert_eq!(relay.members(), [UserId::from("u2")]);
    assert!(a.transports.last().closed.get());
    assert!(a.devices.tracks.borrow().iter().all(|t| t.is_stopped()));
}

#[tokio::test]
async fn dropped_room_leaves() {
    let relay = Rc::new(Relay::default());
    let (a, b) = connected_pair(&relay).await;
    let devices = Rc::clone(&a.devices);

    drop(a);
    settle(&[&b]).await;

    assert!(b.room.peers().is_empty());
    assert!(b.room.participants().is_empty());
    assert!(devices.tracks.borrow().iter().all(|t| t.is_stopped()));
}

#[tokio::test]
async fn chat_reaches_every_member() {
    let relay = Rc::new(Relay::default());
    let (a, b) = connected_pair(&relay).await;
    let received = Rc::new(RefCell::new(Vec::new()));
    for client in &[&a, &b] {
        let received = Rc::clone(&received);
        client.room.on_message(move |m| {
            received.borrow_mut().push((m.user_id, m.content));
        });
    }

    a.room
        .send_message("hello".into(), MessageKind::Text)
        .unwrap();
    settle(&[&a, &b]).await;

    assert_eq!(
        *received.borrow(),
        [
            (UserId::from("u1"), String::from("hello")),
            (UserId::from("u1"), String::from("hello")),
        ],
    );
}
