#![allow(clippy::module_name_repetitions)]
#![forbid(non_ascii_idents, unsafe_code)]

mod mesh;
mod platform;
mod relay;

use std::{cell::RefCell, rc::Rc};

use meshroom::{
    platform::{MediaDevices, RtcPeerConnectionFactory},
    Conf, Room,
};

use self::{
    platform::{Devices, Transports},
    relay::Relay,
};

/// Single client of a [`Relay`] with its own devices and transports.
pub struct Client {
    pub room: Room,
    pub devices: Rc<Devices>,
    pub transports: Rc<Transports>,
    pub errors: Rc<RefCell<Vec<String>>>,
}

impl Client {
    pub fn new(relay: &Rc<Relay>, id: &str) -> Self {
        let devices = Devices::new(id);
        let transports = Rc::new(Transports::default());
        let room = Room::new(
            relay.connect(id),
            Rc::clone(&devices) as Rc<dyn MediaDevices>,
            Rc::clone(&transports) as Rc<dyn RtcPeerConnectionFactory>,
            &Conf::default(),
        );
        let errors = Rc::new(RefCell::new(Vec::new()));
        let errors_clone = Rc::clone(&errors);
        room.on_error(move |e| {
            errors_clone.borrow_mut().push(e.message().to_owned());
        });
        Self {
            room,
            devices,
            transports,
            errors,
        }
    }
}

/// Lets the provided [`Client`]s exchange everything queued between them.
pub async fn settle(clients: &[&Client]) {
    for _ in 0..16 {
        for client in clients {
            client.room.drain_pending().await;
        }
    }
}

/// Joins the provided [`Client`] to the room, letting the `others` react on
/// it meanwhile.
pub async fn join(client: &Client, name: &str, others: &[&Client]) {
    let mut everyone = others.to_vec();
    everyone.push(client);
    let (res, ()) = futures::join!(
        client.room.join("R1".into(), name.into(), None),
        settle(&everyone),
    );
    res.unwrap();
    settle(&everyone).await;
}
