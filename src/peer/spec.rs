use std::rc::Rc;

use futures::{channel::mpsc, StreamExt as _};
use meshroom_signalling_proto::{IceCandidate, UserId};

use crate::{
    media::{local, LocalTracks, MediaKind, MediaSourceKind},
    platform::{
        self,
        fake::{FakePeerConnection, FakePeerConnectionFactory, FakeTrack},
        PeerConnectionState,
    },
};

use super::{
    NegotiationRole, NegotiationState, PeerConnection, PeerError, PeerEvent,
    PeerRepository,
};

fn local_track(id: &str, kind: MediaKind) -> Rc<local::Track> {
    Rc::new(local::Track::new(
        FakeTrack::new(id, kind),
        MediaSourceKind::Device,
    ))
}

fn tracks(audio: &str, video: Option<&str>) -> LocalTracks {
    LocalTracks {
        audio: Some(local_track(audio, MediaKind::Audio)),
        video: video.map(|id| local_track(id, MediaKind::Video)),
    }
}

fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{}", n),
        sdp_m_line_index: Some(0),
        sdp_mid: Some("0".into()),
    }
}

fn remote(id: &str, kind: MediaKind) -> Rc<dyn platform::MediaStreamTrack> {
    FakeTrack::new(id, kind)
}

struct Setup {
    peer: Rc<PeerConnection>,
    transport: Rc<FakePeerConnection>,
    events: mpsc::UnboundedReceiver<PeerEvent>,
}

fn setup(role: NegotiationRole, polite: bool) -> Setup {
    let factory = FakePeerConnectionFactory::default();
    let (tx, events) = mpsc::unbounded();
    let peer = PeerConnection::new(
        UserId::from("u2"),
        role,
        polite,
        &factory,
        &[],
        tx,
    )
    .unwrap();
    Setup {
        peer,
        transport: factory.last(),
        events,
    }
}

#[tokio::test]
async fn offerer_attaches_tracks_and_waits_for_answer() {
    let s = setup(NegotiationRole::Offerer, false);
    let local = tracks("mic", Some("cam"));

    let offer = s.peer.create_outgoing(&local).await.unwrap();

    assert_eq!(offer, "offer-1");
    assert_eq!(s.peer.state(), NegotiationState::Negotiating);
    assert_eq!(s.transport.calls(), ["add-audio", "add-video", "offer"]);
    let mut attached = s.peer.local_tracks_attached();
    attached.sort_by_key(|k| k.to_string());
    assert_eq!(attached, [MediaKind::Audio, MediaKind::Video]);

    s.peer.handle_incoming_answer("answer".into()).await.unwrap();
    assert_eq!(s.peer.state(), NegotiationState::Negotiating);

    s.peer.add_remote_track(remote("r-video", MediaKind::Video));
    assert_eq!(s.peer.state(), NegotiationState::Connected);
}

#[tokio::test]
async fn answerer_answers_and_connects_on_first_remote_track() {
    let s = setup(NegotiationRole::Answerer, true);

    let answer = s
        .peer
        .handle_incoming_offer("offer".into(), &tracks("mic", None))
        .await
        .unwrap();

    assert_eq!(answer.as_deref(), Some("answer"));
    assert_eq!(s.transport.calls(), ["remote-offer", "add-audio", "answer"]);
    assert_eq!(s.peer.state(), NegotiationState::Negotiating);

    s.peer.add_remote_track(remote("r-audio", MediaKind::Audio));
    assert_eq!(s.peer.state(), NegotiationState::Connected);
    assert_eq!(s.peer.remote_tracks().len(), 1);
}

#[tokio::test]
async fn answerer_offers_kinds_missing_from_remote_offer() {
    let s = setup(NegotiationRole::Answerer, true);

    let answer = s
        .peer
        .handle_incoming_offer(
            "v=0 audio".into(),
            &tracks("mic", Some("cam")),
        )
        .await
        .unwrap();
    assert_eq!(answer.as_deref(), Some("answer"));
    assert_eq!(s.peer.renegotiate_if_needed().await.unwrap(), None);

    s.peer.add_remote_track(remote("r-audio", MediaKind::Audio));
    assert_eq!(s.peer.state(), NegotiationState::Connected);

    let offer = s.peer.renegotiate_if_needed().await.unwrap();
    assert_eq!(offer.as_deref(), Some("offer-1"));
    assert_eq!(s.peer.state(), NegotiationState::Renegotiating);

    s.peer.handle_incoming_answer("answer".into()).await.unwrap();
    assert_eq!(s.peer.state(), NegotiationState::Connected);
    assert_eq!(s.peer.renegotiate_if_needed().await.unwrap(), None);
}

#[tokio::test]
async fn answerer_keeps_session_when_offer_covers_every_kind() {
    let s = setup(NegotiationRole::Answerer, true);

    s.peer
        .handle_incoming_offer(
            "v=0 audio video".into(),
            &tracks("mic", Some("cam")),
        )
        .await
        .unwrap();
    s.peer.add_remote_track(remote("r-video", MediaKind::Video));

    assert_eq!(s.peer.renegotiate_if_needed().await.unwrap(), None);
    assert_eq!(s.transport.offers_made(), 0);
    assert_eq!(s.peer.state(), NegotiationState::Connected);
}

#[tokio::test]
async fn buffers_candidates_until_remote_description() {
    let s = setup(NegotiationRole::Offerer, false);
    s.peer.create_outgoing(&tracks("mic", None)).await.unwrap();

    s.peer.handle_incoming_candidate(candidate(1)).await.unwrap();
    s.peer.handle_incoming_candidate(candidate(2)).await.unwrap();
    assert_eq!(s.peer.pending_candidates_count(), 2);
    assert!(s.transport.candidates.borrow().is_empty());

    s.peer.handle_incoming_answer("answer".into()).await.unwrap();

    assert_eq!(s.peer.pending_candidates_count(), 0);
    assert_eq!(*s.transport.candidates.borrow(), [candidate(1), candidate(2)]);

    s.peer.handle_incoming_candidate(candidate(3)).await.unwrap();
    assert_eq!(
        *s.transport.candidates.borrow(),
        [candidate(1), candidate(2), candidate(3)],
    );
}

#[tokio::test]
async fn drops_stale_answer() {
    let s = setup(NegotiationRole::Answerer, true);

    s.peer.handle_incoming_answer("answer".into()).await.unwrap();
    assert_eq!(s.peer.state(), NegotiationState::Idle);

    s.peer
        .handle_incoming_offer("offer".into(), &tracks("mic", None))
        .await
        .unwrap();
    s.peer.handle_incoming_answer("answer".into()).await.unwrap();

    assert!(!s.transport.calls().contains(&"remote-answer".to_owned()));
    assert_eq!(s.peer.state(), NegotiationState::Negotiating);
}

#[tokio::test]
async fn replaces_negotiated_tracks_without_renegotiation() {
    let s = setup(NegotiationRole::Offerer, false);
    let local = tracks("mic", Some("cam-1"));
    s.peer.create_outgoing(&local).await.unwrap();
    s.peer.handle_incoming_answer("answer".into()).await.unwrap();
    s.peer.add_remote_track(remote("r-video", MediaKind::Video));
    let mut states = s.peer.on_state_change();
    assert_eq!(states.next().await, Some(NegotiationState::Connected));

    let updated = LocalTracks {
        audio: local.audio.clone(),
        video: Some(local_track("cam-2", MediaKind::Video)),
    };
    let offer = s.peer.update_local_tracks(&updated).await.unwrap();

    assert_eq!(offer, None);
    assert_eq!(
        *s.transport.replaced.borrow(),
        [(MediaKind::Video, Some("cam-2".to_owned()))],
    );
    assert_eq!(s.transport.offers_made(), 1);
    assert_eq!(s.peer.state(), NegotiationState::Connected);
    assert!(futures::poll!(states.next()).is_pending());
    assert_eq!(
        s.peer.local_track(MediaKind::Video).unwrap().id(),
        "cam-2",
    );
}

#[tokio::test]
async fn renegotiates_when_new_kind_appears() {
    let s = setup(NegotiationRole::Offerer, false);
    let local = tracks("mic", None);
    s.peer.create_outgoing(&local).await.unwrap();
    s.peer.handle_incoming_answer("answer".into()).await.unwrap();
    s.peer.add_remote_track(remote("r-audio", MediaKind::Audio));

    let updated = LocalTracks {
        audio: local.audio.clone(),
        video: Some(local_track("screen", MediaKind::Video)),
    };
    let offer = s.peer.update_local_tracks(&updated).await.unwrap();

    assert_eq!(offer.as_deref(), Some("offer-2"));
    assert_eq!(s.peer.state(), NegotiationState::Renegotiating);

    s.peer.handle_incoming_answer("answer".into()).await.unwrap();
    assert_eq!(s.peer.state(), NegotiationState::Connected);
}

#[tokio::test]
async fn polite_side_rolls_back_on_glare() {
    let s = setup(NegotiationRole::Offerer, true);
    let local = tracks("mic", None);
    s.peer.create_outgoing(&local).await.unwrap();

    let answer = s
        .peer
        .handle_incoming_offer("their-offer".into(), &local)
        .await
        .unwrap();

    assert_eq!(answer.as_deref(), Some("answer"));
    assert!(s.transport.calls().contains(&"rollback".to_owned()));

    s.peer.add_remote_track(remote("r-audio", MediaKind::Audio));
    let offer = s.peer.renegotiate_if_needed().await.unwrap();
    assert_eq!(offer.as_deref(), Some("offer-2"));
}

#[tokio::test]
async fn impolite_side_drops_crossing_offer() {
    let s = setup(NegotiationRole::Offerer, false);
    s.peer.create_outgoing(&tracks("mic", None)).await.unwrap();

    let answer = s
        .peer
        .handle_incoming_offer("their-offer".into(), &tracks("mic", None))
        .await
        .unwrap();

    assert_eq!(answer, None);
    assert!(!s.transport.calls().contains(&"rollback".to_owned()));
    assert_eq!(s.peer.state(), NegotiationState::Negotiating);
}

#[tokio::test]
async fn fails_on_transport_error() {
    let s = setup(NegotiationRole::Answerer, true);
    *s.transport.fail_remote_description.borrow_mut() =
        Some(platform::Error::new("OperationError", "bad sdp"));

    let err = s
        .peer
        .handle_incoming_offer("offer".into(), &tracks("mic", None))
        .await
        .unwrap_err();

    assert!(matches!(err.as_ref(), PeerError::NegotiationFailed(_)));
    assert_eq!(s.peer.state(), NegotiationState::Failed);
}

#[tokio::test]
async fn discards_steps_finishing_after_close() {
    let s = setup(NegotiationRole::Answerer, true);
    let local = tracks("mic", None);
    let release = s.transport.hold();

    let (res, ()) = futures::join!(
        s.peer.handle_incoming_offer("offer".into(), &local),
        async {
            s.peer.close();
            let _ = release.send(());
        },
    );

    assert!(matches!(res.unwrap_err().as_ref(), PeerError::Closed));
    assert_eq!(s.peer.state(), NegotiationState::Closed);
    assert!(!s.transport.calls().contains(&"answer".to_owned()));
}

#[tokio::test]
async fn close_releases_everything() {
    let s = setup(NegotiationRole::Offerer, false);
    s.peer.create_outgoing(&tracks("mic", None)).await.unwrap();
    s.peer.handle_incoming_candidate(candidate(1)).await.unwrap();
    let received = s
        .peer
        .add_remote_track(remote("r-audio", MediaKind::Audio))
        .unwrap();
    let stopped = Rc::new(std::cell::Cell::new(false));
    let stopped_clone = Rc::clone(&stopped);
    received.on_stopped(move |_| stopped_clone.set(true));

    s.peer.close();
    s.peer.close();

    assert!(stopped.get());
    assert!(s.transport.closed.get());
    assert!(s.transport.on_track.borrow().is_none());
    assert!(s.peer.local_tracks_attached().is_empty());
    assert_eq!(s.peer.pending_candidates_count(), 0);
    assert_eq!(
        s.transport.calls().iter().filter(|c| *c == "close").count(),
        1,
    );
}

#[tokio::test]
async fn forwards_transport_callbacks_as_events() {
    let mut s = setup(NegotiationRole::Offerer, false);

    s.transport.fire_candidate(candidate(7));
    s.transport.fire_track(remote("r-video", MediaKind::Video));
    s.transport.fire_state(PeerConnectionState::Failed);

    match s.events.next().await.unwrap() {
        PeerEvent::IceCandidateDiscovered { remote_id, candidate: c } => {
            assert_eq!(remote_id, UserId::from("u2"));
            assert_eq!(c, candidate(7));
        }
        e => panic!("unexpected {:?}", e),
    }
    assert!(matches!(
        s.events.next().await.unwrap(),
        PeerEvent::NewRemoteTrack { .. },
    ));
    assert!(matches!(
        s.events.next().await.unwrap(),
        PeerEvent::ConnectionStateChanged {
            state: PeerConnectionState::Failed,
            ..
        },
    ));

    s.peer.close();
    assert!(matches!(
        s.events.next().await.unwrap(),
        PeerEvent::NegotiationStateChanged {
            state: NegotiationState::Closed,
            ..
        },
    ));
}

mod repository {
    use super::*;

    fn repo() -> (PeerRepository, Rc<FakePeerConnectionFactory>) {
        let factory = Rc::new(FakePeerConnectionFactory::default());
        let (tx, _rx) = mpsc::unbounded();
        let repo = PeerRepository::new(
            Rc::clone(&factory) as Rc<dyn platform::RtcPeerConnectionFactory>,
            Vec::new(),
            tx,
        );
        (repo, factory)
    }

    #[test]
    fn keeps_single_session_per_participant() {
        let (repo, factory) = repo();
        let me = UserId::from("u1");

        let first = repo
            .create(&me, UserId::from("u2"), NegotiationRole::Offerer)
            .unwrap();
        let second = repo
            .create(&me, UserId::from("u2"), NegotiationRole::Answerer)
            .unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(repo.len(), 1);
        assert_eq!(factory.created.borrow().len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let (repo, factory) = repo();
        let me = UserId::from("u1");
        let _ = repo
            .create(&me, UserId::from("u2"), NegotiationRole::Offerer)
            .unwrap();

        assert!(repo.remove(&UserId::from("u2")));
        assert!(!repo.remove(&UserId::from("u2")));
        assert!(repo.is_empty());
        assert!(factory.last().closed.get());
    }

    #[test]
    fn politeness_follows_id_order() {
        let (repo, _) = repo();
        let peer = repo
            .create(
                &UserId::from("a"),
                UserId::from("b"),
                NegotiationRole::Offerer,
            )
            .unwrap();
        assert!(peer.polite);

        let peer = repo
            .create(
                &UserId::from("c"),
                UserId::from("a"),
                NegotiationRole::Answerer,
            )
            .unwrap();
        assert!(!peer.polite);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn reports_transport_creation_failure() {
        let (repo, factory) = repo();
        factory.fail.set(true);

        let err = repo
            .create(
                &UserId::from("u1"),
                UserId::from("u2"),
                NegotiationRole::Offerer,
            )
            .unwrap_err();

        assert!(matches!(err.as_ref(), PeerError::RtcPeerConnection(_)));
        assert!(repo.is_empty());
    }
}
