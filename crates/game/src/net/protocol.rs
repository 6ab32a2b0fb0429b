use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};

use super::transport::PeerId;
use crate::player::{MovementButton, PlayerInputs};
use crate::replication::ReplicatedState;

#[cfg(target_endian = "big")]
compile_error!("netsync payloads are laid out little-endian; big-endian hosts are not supported");

pub type EntityId = u32;
pub type VersionId = u32;

pub const MAX_PLAYERS: usize = 4;
pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_SNAPSHOT_RATE: u32 = 20;
pub const DEFAULT_SIMULATION_RATE: u32 = 60;
pub const ORIENTATION_QUANT_SCALE: f32 = 127.0;

const TAG_SIZE: usize = std::mem::size_of::<u16>();
const EMPTY_SLOT: i32 = -1;

/// Identifies the payload layout that follows the 2-byte tag on the wire.
///
/// `Other` carries tags outside the known set; build it through `From<u16>`
/// so known values always map to their named variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    FullState,
    DeltaState,
    PlayerInput,
    Roster,
    Ack,
    Despawn,
    GameStart,
    GameEnd,
    InventorySync,
    BuffSync,
    SuspicionSync,
    Other(u16),
}

impl MessageTag {
    pub fn is_replication(self) -> bool {
        matches!(
            self,
            MessageTag::FullState
                | MessageTag::DeltaState
                | MessageTag::PlayerInput
                | MessageTag::Roster
                | MessageTag::Ack
                | MessageTag::Despawn
        )
    }
}

impl From<u16> for MessageTag {
    fn from(value: u16) -> Self {
        match value {
            1 => MessageTag::FullState,
            2 => MessageTag::DeltaState,
            3 => MessageTag::PlayerInput,
            4 => MessageTag::Roster,
            5 => MessageTag::Ack,
            6 => MessageTag::Despawn,
            16 => MessageTag::GameStart,
            17 => MessageTag::GameEnd,
            18 => MessageTag::InventorySync,
            19 => MessageTag::BuffSync,
            20 => MessageTag::SuspicionSync,
            other => MessageTag::Other(other),
        }
    }
}

impl From<MessageTag> for u16 {
    fn from(tag: MessageTag) -> Self {
        match tag {
            MessageTag::FullState => 1,
            MessageTag::DeltaState => 2,
            MessageTag::PlayerInput => 3,
            MessageTag::Roster => 4,
            MessageTag::Ack => 5,
            MessageTag::Despawn => 6,
            MessageTag::GameStart => 16,
            MessageTag::GameEnd => 17,
            MessageTag::InventorySync => 18,
            MessageTag::BuffSync => 19,
            MessageTag::SuspicionSync => 20,
            MessageTag::Other(value) => value,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InputFlags: u8 {
        const FORWARD = 1 << 0;
        const BACK = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const SPRINT = 1 << 4;
        const CROUCH = 1 << 5;
    }
}

impl InputFlags {
    fn for_button(button: MovementButton) -> Self {
        match button {
            MovementButton::Forward => InputFlags::FORWARD,
            MovementButton::Back => InputFlags::BACK,
            MovementButton::Left => InputFlags::LEFT,
            MovementButton::Right => InputFlags::RIGHT,
        }
    }

    pub fn from_inputs(inputs: &PlayerInputs) -> Self {
        let mut flags = InputFlags::empty();
        for button in MovementButton::ALL {
            flags.set(Self::for_button(button), inputs.is_pressed(button));
        }
        flags.set(InputFlags::SPRINT, inputs.sprint);
        flags.set(InputFlags::CROUCH, inputs.crouch);
        flags
    }

    fn apply_to(self, inputs: &mut PlayerInputs) {
        for button in MovementButton::ALL {
            inputs.set_pressed(button, self.contains(Self::for_button(button)));
        }
        inputs.sprint = self.contains(InputFlags::SPRINT);
        inputs.crouch = self.contains(InputFlags::CROUCH);
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message of {len} bytes is too short to carry a tag")]
    Truncated { len: usize },
    #[error("{tag:?} payload is {actual} bytes, expected {expected}")]
    SizeMismatch {
        tag: MessageTag,
        expected: usize,
        actual: usize,
    },
}

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FullPayload {
    entity_id: u32,
    version_id: u32,
    position: [f32; 3],
    orientation: [f32; 4],
}

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct DeltaPayload {
    entity_id: u32,
    base_version_id: u32,
    pos_delta: [i8; 3],
    orient_delta: [i8; 4],
}

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct InputPayload {
    player_slot: i32,
    flags: u8,
    camera_yaw: f32,
    forward_axis: [f32; 3],
    right_axis: [f32; 3],
    last_accepted_version_id: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RosterPayload {
    slots: [i32; MAX_PLAYERS],
}

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct AckPayload {
    entity_id: u32,
    version_id: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct DespawnPayload {
    entity_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullMessage {
    pub entity_id: EntityId,
    pub state: ReplicatedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaMessage {
    pub entity_id: EntityId,
    pub base_version_id: VersionId,
    pub pos_delta: [i8; 3],
    pub orient_delta: [i8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputMessage {
    pub player_slot: Option<usize>,
    pub inputs: PlayerInputs,
    pub last_accepted_version_id: VersionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RosterMessage {
    pub slots: [Option<PeerId>; MAX_PLAYERS],
}

impl RosterMessage {
    pub fn slot_of(&self, peer: PeerId) -> Option<usize> {
        self.slots.iter().position(|slot| *slot == Some(peer))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMessage {
    pub entity_id: EntityId,
    pub version_id: VersionId,
}

/// The entity left the server's world; receivers drop their copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DespawnMessage {
    pub entity_id: EntityId,
}

/// Payload owned by a subsystem outside replication; routed by tag only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMessage {
    pub tag: MessageTag,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Full(FullMessage),
    Delta(DeltaMessage),
    Input(InputMessage),
    Roster(RosterMessage),
    Ack(AckMessage),
    Despawn(DespawnMessage),
    App(AppMessage),
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::Full(_) => MessageTag::FullState,
            Message::Delta(_) => MessageTag::DeltaState,
            Message::Input(_) => MessageTag::PlayerInput,
            Message::Roster(_) => MessageTag::Roster,
            Message::Ack(_) => MessageTag::Ack,
            Message::Despawn(_) => MessageTag::Despawn,
            Message::App(app) => app.tag,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let tag = self.tag();
        match self {
            Message::Full(full) => write_frame(
                tag,
                &FullPayload {
                    entity_id: full.entity_id,
                    version_id: full.state.version_id,
                    position: full.state.position.to_array(),
                    orientation: full.state.orientation.to_array(),
                },
            ),
            Message::Delta(delta) => write_frame(
                tag,
                &DeltaPayload {
                    entity_id: delta.entity_id,
                    base_version_id: delta.base_version_id,
                    pos_delta: delta.pos_delta,
                    orient_delta: delta.orient_delta,
                },
            ),
            Message::Input(input) => write_frame(
                tag,
                &InputPayload {
                    player_slot: input.player_slot.map_or(EMPTY_SLOT, |slot| slot as i32),
                    flags: InputFlags::from_inputs(&input.inputs).bits(),
                    camera_yaw: input.inputs.camera_yaw,
                    forward_axis: input.inputs.forward_axis.to_array(),
                    right_axis: input.inputs.right_axis.to_array(),
                    last_accepted_version_id: input.last_accepted_version_id,
                },
            ),
            Message::Roster(roster) => write_frame(
                tag,
                &RosterPayload {
                    slots: roster
                        .slots
                        .map(|slot| slot.map_or(EMPTY_SLOT, |peer| peer.0 as i32)),
                },
            ),
            Message::Ack(ack) => write_frame(
                tag,
                &AckPayload {
                    entity_id: ack.entity_id,
                    version_id: ack.version_id,
                },
            ),
            Message::Despawn(despawn) => write_frame(
                tag,
                &DespawnPayload {
                    entity_id: despawn.entity_id,
                },
            ),
            Message::App(app) => {
                let mut buf = Vec::with_capacity(TAG_SIZE + app.payload.len());
                buf.extend_from_slice(&u16::from(tag).to_le_bytes());
                buf.extend_from_slice(&app.payload);
                buf
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let tag = peek_tag(bytes)?;
        let body = &bytes[TAG_SIZE..];

        let message = match tag {
            MessageTag::FullState => {
                let p: FullPayload = read_payload(tag, body)?;
                Message::Full(FullMessage {
                    entity_id: p.entity_id,
                    state: ReplicatedState {
                        version_id: p.version_id,
                        position: Vec3::from_array(p.position),
                        orientation: Quat::from_array(p.orientation),
                    },
                })
            }
            MessageTag::DeltaState => {
                let p: DeltaPayload = read_payload(tag, body)?;
                Message::Delta(DeltaMessage {
                    entity_id: p.entity_id,
                    base_version_id: p.base_version_id,
                    pos_delta: p.pos_delta,
                    orient_delta: p.orient_delta,
                })
            }
            MessageTag::PlayerInput => {
                let p: InputPayload = read_payload(tag, body)?;
                let mut inputs = PlayerInputs {
                    camera_yaw: p.camera_yaw,
                    forward_axis: Vec3::from_array(p.forward_axis),
                    right_axis: Vec3::from_array(p.right_axis),
                    ..Default::default()
                };
                InputFlags::from_bits_truncate(p.flags).apply_to(&mut inputs);
                let slot = p.player_slot;
                Message::Input(InputMessage {
                    player_slot: usize::try_from(slot).ok(),
                    inputs,
                    last_accepted_version_id: p.last_accepted_version_id,
                })
            }
            MessageTag::Roster => {
                let p: RosterPayload = read_payload(tag, body)?;
                let slots = p.slots;
                Message::Roster(RosterMessage {
                    slots: slots.map(|slot| u32::try_from(slot).ok().map(PeerId)),
                })
            }
            MessageTag::Ack => {
                let p: AckPayload = read_payload(tag, body)?;
                Message::Ack(AckMessage {
                    entity_id: p.entity_id,
                    version_id: p.version_id,
                })
            }
            MessageTag::Despawn => {
                let p: DespawnPayload = read_payload(tag, body)?;
                Message::Despawn(DespawnMessage {
                    entity_id: p.entity_id,
                })
            }
            _ => Message::App(AppMessage {
                tag,
                payload: body.to_vec(),
            }),
        };

        Ok(message)
    }
}

pub fn peek_tag(bytes: &[u8]) -> Result<MessageTag, WireError> {
    match bytes {
        [lo, hi, ..] => Ok(MessageTag::from(u16::from_le_bytes([*lo, *hi]))),
        _ => Err(WireError::Truncated { len: bytes.len() }),
    }
}

fn write_frame<P: Pod>(tag: MessageTag, payload: &P) -> Vec<u8> {
    let body = bytemuck::bytes_of(payload);
    let mut buf = Vec::with_capacity(TAG_SIZE + body.len());
    buf.extend_from_slice(&u16::from(tag).to_le_bytes());
    buf.extend_from_slice(body);
    buf
}

fn read_payload<P: Pod>(tag: MessageTag, body: &[u8]) -> Result<P, WireError> {
    let expected = std::mem::size_of::<P>();
    if body.len() != expected {
        return Err(WireError::SizeMismatch {
            tag,
            expected,
            actual: body.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(body))
}
