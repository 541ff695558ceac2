//! In-memory signalling relay serving a single room.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use futures::{
    channel::mpsc,
    stream::{self, LocalBoxStream, StreamExt as _},
};
use meshroom::signalling::SignallingChannel;
use meshroom_signalling_proto::{
    Command, Event, MediaFlags, MediaFlagsPatch, Message, Participant, UserId,
};

#[derive(Default)]
pub struct Relay {
    members: RefCell<Vec<Participant>>,
    clients: RefCell<HashMap<UserId, mpsc::UnboundedSender<Event>>>,
    sent_messages: RefCell<u32>,
}

impl Relay {
    /// Opens a connection of the client the provided ID is assigned to.
    pub fn connect(self: &Rc<Self>, id: &str) -> Rc<Connection> {
        let (tx, rx) = mpsc::unbounded();
        let id = UserId::from(id);
        drop(self.clients.borrow_mut().insert(id.clone(), tx));
        Rc::new(Connection {
            relay: Rc::clone(self),
            id,
            events: RefCell::new(Some(rx)),
        })
    }

    pub fn members(&self) -> Vec<UserId> {
        self.members.borrow().iter().map(|p| p.id.clone()).collect()
    }

    fn deliver(&self, to: &UserId, event: Event) {
        if let Some(tx) = self.clients.borrow().get(to) {
            let _ = tx.unbounded_send(event);
        }
    }

    fn broadcast(&self, except: Option<&UserId>, event: &Event) {
        for member in self.members() {
            if Some(&member) != except {
                self.deliver(&member, event.clone());
            }
        }
    }

    fn update_flags(&self, from: &UserId, patch: MediaFlagsPatch) {
        for member in self.members.borrow_mut().iter_mut() {
            if &member.id == from {
                member.media.apply(&patch);
            }
        }
        self.broadcast(
            Some(from),
            &Event::UserMediaUpdated {
                user_id: from.clone(),
                media_state: patch,
            },
        );
    }

    fn handle(&self, from: &UserId, command: Command) {
        match command {
            Command::JoinRoom { user_name, .. } => {
                let user = Participant {
                    id: from.clone(),
                    display_name: user_name,
                    is_host: self.members.borrow().is_empty(),
                    is_hand_raised: false,
                    media: MediaFlags {
                        audio_enabled: true,
                        video_enabled: true,
                        screen_sharing: false,
                    },
                };
                self.members.borrow_mut().push(user.clone());
                self.deliver(
                    from,
                    Event::RoomUsers {
                        user_id: from.clone(),
                        users: self.members.borrow().clone(),
                    },
                );
                self.broadcast(Some(from), &Event::UserJoined { user });
            }
            Command::LeaveRoom => {
                self.members.borrow_mut().retain(|p| &p.id != from);
                self.broadcast(
                    None,
                    &Event::UserLeft {
                        user_id: from.clone(),
                    },
                );
            }
            Command::ToggleAudio { enabled } => self.update_flags(
                from,
                MediaFlagsPatch {
                    audio_enabled: Some(enabled),
                    ..MediaFlagsPatch::default()
                },
            ),
            Command::ToggleVideo { enabled } => self.update_flags(
                from,
                MediaFlagsPatch {
                    video_enabled: Some(enabled),
                    ..MediaFlagsPatch::default()
                },
            ),
            Command::ToggleScreenShare { enabled } => self.update_flags(
                from,
                MediaFlagsPatch {
                    screen_sharing: Some(enabled),
                    ..MediaFlagsPatch::default()
                },
            ),
            Command::SendMessage { content, kind } => {
                *self.sent_messages.borrow_mut() += 1;
                let message = Message {
                    id: format!("m{}", self.sent_messages.borrow()),
                    user_id: from.clone(),
                    user_name: from.to_string(),
                    content,
                    kind,
                    timestamp: "2021-05-01T10:00:00Z".into(),
                    file_url: None,
                    file_name: None,
                };
                self.broadcast(None, &Event::NewMessage { message });
            }
            Command::WebrtcOffer { offer, to_user_id } => self.deliver(
                &to_user_id,
                Event::WebrtcOffer {
                    offer,
                    from_user_id: from.clone(),
                },
            ),
            Command::WebrtcAnswer { answer, to_user_id } => self.deliver(
                &to_user_id,
                Event::WebrtcAnswer {
                    answer,
                    from_user_id: from.clone(),
                },
            ),
            Command::IceCandidate {
                candidate,
                to_user_id,
            } => self.deliver(
                &to_user_id,
                Event::IceCandidate {
                    candidate,
                    from_user_id: from.clone(),
                },
            ),
        }
    }
}

/// Connection of a single client to the [`Relay`].
pub struct Connection {
    relay: Rc<Relay>,
    id: UserId,
    events: RefCell<Option<mpsc::UnboundedReceiver<Event>>>,
}

impl SignallingChannel for Connection {
    fn subscribe(&self) -> LocalBoxStream<'static, Event> {
        match self.events.borrow_mut().take() {
            Some(rx) => rx.boxed_local(),
            None => stream::empty().boxed_local(),
        }
    }

    fn send_command(&self, command: Command) {
        self.relay.handle(&self.id, command);
    }
}
