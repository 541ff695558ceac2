//! Signalling protocol of [Meshroom] session orchestrator.
//!
//! Every message is a JSON object of `{"event": <kind>, "data": <payload>}`
//! shape, where `<kind>` is a `kebab-case` message name.
//!
//! - [`Command`]s are sent by a client to the signalling relay.
//! - [`Event`]s are sent by the signalling relay to a client.
//!
//! [Meshroom]: ../meshroom/index.html

#![forbid(unsafe_code)]

use derive_more::{Display, From};
use meshroom_macro::dispatchable;
use serde::{Deserialize, Serialize};

/// ID of a room.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
pub struct RoomId(pub String);

/// ID of a room participant, assigned by the signalling relay.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[from(forward)]
pub struct UserId(pub String);

/// Media publishing flags of a participant.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(default)]
pub struct MediaFlags {
    /// Whether the microphone is unmuted.
    #[serde(rename = "isAudioEnabled")]
    pub audio_enabled: bool,

    /// Whether the camera is on.
    #[serde(rename = "isVideoEnabled")]
    pub video_enabled: bool,

    /// Whether the screen is being shared.
    #[serde(rename = "isScreenSharing")]
    pub screen_sharing: bool,
}

impl MediaFlags {
    /// Applies the given [`MediaFlagsPatch`] to these [`MediaFlags`].
    pub fn apply(&mut self, patch: &MediaFlagsPatch) {
        if let Some(audio_enabled) = patch.audio_enabled {
            self.audio_enabled = audio_enabled;
        }
        if let Some(video_enabled) = patch.video_enabled {
            self.video_enabled = video_enabled;
        }
        if let Some(screen_sharing) = patch.screen_sharing {
            self.screen_sharing = screen_sharing;
        }
    }
}

/// Partial update of [`MediaFlags`].
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(default)]
pub struct MediaFlagsPatch {
    #[serde(rename = "isAudioEnabled", skip_serializing_if = "Option::is_none")]
    pub audio_enabled: Option<bool>,

    #[serde(rename = "isVideoEnabled", skip_serializing_if = "Option::is_none")]
    pub video_enabled: Option<bool>,

    #[serde(
        rename = "isScreenSharing",
        skip_serializing_if = "Option::is_none"
    )]
    pub screen_sharing: Option<bool>,
}

/// Member of a room, as seen by other members.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// ID of this [`Participant`].
    pub id: UserId,

    /// Name this [`Participant`] joined with.
    #[serde(rename = "name")]
    pub display_name: String,

    /// Whether this [`Participant`] has created the room.
    #[serde(default)]
    pub is_host: bool,

    /// Whether this [`Participant`] has raised a hand.
    #[serde(default)]
    pub is_hand_raised: bool,

    /// Media publishing flags of this [`Participant`].
    #[serde(flatten)]
    pub media: MediaFlags,
}

/// Kind of a chat [`Message`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
    Emoji,
}

/// Chat message delivered through the signalling relay.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub user_id: UserId,
    pub user_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Time the relay accepted this [`Message`] at, in [RFC 3339] format.
    ///
    /// [RFC 3339]: https://www.ietf.org/rfc/rfc3339.txt
    pub timestamp: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Type of a [`SessionDescription`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Represents [RTCSessionDescriptionInit][1] object.
///
/// [1]: https://www.w3.org/TR/webrtc/#dom-rtcsessiondescriptioninit
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    /// Creates a new SDP offer.
    #[inline]
    pub fn offer<S: Into<String>>(sdp: S) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Creates a new SDP answer.
    #[inline]
    pub fn answer<S: Into<String>>(sdp: S) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Represents [RTCIceCandidateInit][1] object.
///
/// [1]: https://www.w3.org/TR/webrtc/#dom-rtcicecandidateinit
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_m_line_index: Option<u16>,
    pub sdp_mid: Option<String>,
}

/// Message sent by a client to the signalling relay.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Command {
    /// Request to join a room.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: RoomId,
        user_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },

    /// Notice that the client leaves its current room.
    LeaveRoom,

    /// Microphone of the client has been muted or unmuted.
    ToggleAudio { enabled: bool },

    /// Camera of the client has been turned off or on.
    ToggleVideo { enabled: bool },

    /// Screen sharing of the client has been started or stopped.
    ToggleScreenShare { enabled: bool },

    /// Chat message to be broadcast to the room.
    SendMessage {
        content: String,
        #[serde(rename = "type")]
        kind: MessageKind,
    },

    /// SDP offer for the given room participant.
    #[serde(rename = "webrtc-offer", rename_all = "camelCase")]
    WebrtcOffer {
        offer: SessionDescription,
        to_user_id: UserId,
    },

    /// SDP answer for the given room participant.
    #[serde(rename = "webrtc-answer", rename_all = "camelCase")]
    WebrtcAnswer {
        answer: SessionDescription,
        to_user_id: UserId,
    },

    /// ICE candidate for the given room participant.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: IceCandidate,
        to_user_id: UserId,
    },
}

/// Message sent by the signalling relay to a client.
#[dispatchable(self: &Self, async_trait(?Send))]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Event {
    /// The client has joined the room.
    #[serde(rename_all = "camelCase")]
    RoomUsers {
        /// ID assigned to the client.
        user_id: UserId,

        /// All the current room members, including the client itself.
        users: Vec<Participant>,
    },

    /// New [`Participant`] has joined the room.
    ///
    /// Its data is the [`Participant`] itself.
    UserJoined {
        #[serde(flatten)]
        user: Participant,
    },

    /// [`Participant`] has left the room.
    #[serde(rename_all = "camelCase")]
    UserLeft { user_id: UserId },

    /// [`Participant`] has changed its [`MediaFlags`].
    #[serde(rename_all = "camelCase")]
    UserMediaUpdated {
        user_id: UserId,
        media_state: MediaFlagsPatch,
    },

    /// New chat [`Message`] in the room.
    NewMessage {
        #[serde(flatten)]
        message: Message,
    },

    /// SDP offer from the given room participant.
    #[serde(rename = "webrtc-offer", rename_all = "camelCase")]
    WebrtcOffer {
        offer: SessionDescription,
        from_user_id: UserId,
    },

    /// SDP answer from the given room participant.
    #[serde(rename = "webrtc-answer", rename_all = "camelCase")]
    WebrtcAnswer {
        answer: SessionDescription,
        from_user_id: UserId,
    },

    /// ICE candidate from the given room participant.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: IceCandidate,
        from_user_id: UserId,
    },

    /// Signalling relay has rejected the last request.
    Error { message: String },
}
