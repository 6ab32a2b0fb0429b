use glam::Vec3;

#[derive(Debug, Clone)]
pub struct MovementConfig {
    pub walk_speed: f32,
    pub sprint_speed: f32,
    pub crouch_speed: f32,
    pub spawn_points: Vec<Vec3>,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 4.0,
            sprint_speed: 5.0,
            crouch_speed: 3.5,
            spawn_points: vec![
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(8.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 8.0),
                Vec3::new(8.0, 1.0, 8.0),
            ],
        }
    }
}

impl MovementConfig {
    pub fn speed(&self, sprint: bool, crouch: bool) -> f32 {
        if crouch {
            self.crouch_speed
        } else if sprint {
            self.sprint_speed
        } else {
            self.walk_speed
        }
    }

    pub fn spawn_point(&self, slot: usize) -> Vec3 {
        self.spawn_points.get(slot).copied().unwrap_or(Vec3::Y)
    }
}
