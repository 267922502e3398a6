use crate::constants::{
    suppression_cost_ms, FIRE_BASE_GROWTH, FIRE_CAP_TOLERANCE, MIN_SIZE_DAMPING,
    MITIGATED_DECAY_PER_TICK,
};
use crate::types::{FireState, FireView, Vec2};

#[derive(Clone, Debug)]
pub struct Fire {
    pub id: String,
    pub position: Vec2,
    pub radius: f32,
    pub max_radius: f32,
    pub state: FireState,
}

impl Fire {
    pub fn new(id: String, position: Vec2, radius: f32, max_radius: f32, revealed: bool) -> Self {
        let max_radius = max_radius.max(0.0);
        Self {
            id,
            position,
            radius: radius.clamp(0.0, max_radius),
            max_radius,
            state: if revealed {
                FireState::Revealed
            } else {
                FireState::Hidden
            },
        }
    }

    pub fn is_active(&self) -> bool {
        self.radius > 0.0
    }

    pub fn is_mitigated(&self) -> bool {
        self.state == FireState::Mitigated
    }

    pub fn is_threat(&self) -> bool {
        self.is_active() && !self.is_mitigated()
    }

    pub fn is_revealed(&self) -> bool {
        self.state != FireState::Hidden
    }

    pub fn is_capped(&self) -> bool {
        self.radius >= self.max_radius - FIRE_CAP_TOLERANCE
    }

    pub fn size_ratio(&self) -> f32 {
        if self.max_radius <= 0.0 {
            return 0.0;
        }
        self.radius / self.max_radius
    }

    pub fn area(&self) -> f32 {
        if !self.is_active() {
            return 0.0;
        }
        std::f32::consts::PI * self.radius * self.radius
    }

    pub fn covers(&self, point: Vec2) -> bool {
        self.position.distance(point) < self.radius
    }

    pub fn suppression_cost_ms(&self) -> u64 {
        suppression_cost_ms(self.size_ratio())
    }

    pub fn reveal(&mut self) -> bool {
        if self.state == FireState::Hidden {
            self.state = FireState::Revealed;
            return true;
        }
        false
    }

    /// Suppression always leaves the fire visible.
    pub fn mitigate(&mut self) {
        self.state = FireState::Mitigated;
    }

    /// One tick of growth or decay. `synergy` is the summed neighbor bonus taken
    /// from the fire set as it stood before this tick.
    pub fn update(&mut self, synergy: f32, spread_multiplier: f32) {
        if self.is_mitigated() {
            self.radius = (self.radius - MITIGATED_DECAY_PER_TICK).max(0.0);
            return;
        }
        let damping = (1.0 - self.size_ratio()).max(MIN_SIZE_DAMPING);
        let growth = (FIRE_BASE_GROWTH + synergy) * spread_multiplier * damping;
        if growth.is_finite() && growth > 0.0 {
            self.radius = (self.radius + growth).min(self.max_radius);
        }
    }

    pub fn view(&self) -> FireView {
        FireView {
            id: self.id.clone(),
            x: self.position.x,
            y: self.position.y,
            radius: self.radius,
            max_radius: self.max_radius,
            state: self.state,
        }
    }
}
