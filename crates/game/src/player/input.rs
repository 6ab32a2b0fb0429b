use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

const AXIS_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MovementButton {
    Forward = 0,
    Back = 1,
    Left = 2,
    Right = 3,
}

impl MovementButton {
    pub const ALL: [MovementButton; 4] = [
        MovementButton::Forward,
        MovementButton::Back,
        MovementButton::Left,
        MovementButton::Right,
    ];
}

/// One simulation step worth of player intent.
///
/// `forward_axis` and `right_axis` are world-space and only meaningful when
/// the inputs come from a remote participant; zero axes mean "derive from
/// `camera_yaw`".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerInputs {
    pub movement_buttons: [bool; 4],
    pub sprint: bool,
    pub crouch: bool,
    pub camera_yaw: f32,
    pub forward_axis: Vec3,
    pub right_axis: Vec3,
}

impl PlayerInputs {
    pub fn is_pressed(&self, button: MovementButton) -> bool {
        self.movement_buttons[button as usize]
    }

    pub fn set_pressed(&mut self, button: MovementButton, pressed: bool) {
        self.movement_buttons[button as usize] = pressed;
    }

    pub fn is_idle(&self) -> bool {
        !self.movement_buttons.iter().any(|pressed| *pressed)
    }

    /// Fills in the camera axes for sending to a peer.
    pub fn with_camera_axes(mut self) -> Self {
        let (forward, right) = yaw_axes(self.camera_yaw);
        self.forward_axis = forward;
        self.right_axis = right;
        self
    }

    /// World-space `(forward, right)` axes to move along.
    pub fn movement_axes(&self) -> (Vec3, Vec3) {
        if self.forward_axis.length_squared() < AXIS_EPSILON
            && self.right_axis.length_squared() < AXIS_EPSILON
        {
            yaw_axes(self.camera_yaw)
        } else {
            (self.forward_axis, self.right_axis)
        }
    }

    /// Unnormalized world-space direction implied by the held buttons.
    pub fn wish_direction(&self) -> Vec3 {
        let (forward, right) = self.movement_axes();
        let mut direction = Vec3::ZERO;

        if self.is_pressed(MovementButton::Forward) {
            direction += forward;
        }
        if self.is_pressed(MovementButton::Back) {
            direction -= forward;
        }
        if self.is_pressed(MovementButton::Left) {
            direction -= right;
        }
        if self.is_pressed(MovementButton::Right) {
            direction += right;
        }

        direction
    }
}

pub fn yaw_axes(yaw: f32) -> (Vec3, Vec3) {
    let rotation = Quat::from_rotation_y(yaw);
    (rotation * Vec3::NEG_Z, rotation * Vec3::X)
}
