use brawlnet::{CombatantState, InputFlags, Pickup, Projectile, Winner, WorldState};

const ARENA_WIDTH: f32 = 800.0;
const GROUND_Y: f32 = 500.0;
const MOVE_SPEED: f32 = 240.0;
const JUMP_SPEED: f32 = -520.0;
const GRAVITY: f32 = 1400.0;
const PROJECTILE_SPEED: f32 = 480.0;
const ATTACK_COOLDOWN_TICKS: i32 = 30;
const START_HEALTH: i32 = 100;
const HIT_DAMAGE: i32 = 10;

/// Minimal stand-in for the game simulation so the peer binary has real
/// snapshots to replicate. Player one is local to the authoritative side,
/// player two is driven by the mirror's input.
pub struct Arena {
    state: WorldState,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        let mut arena = Self {
            state: WorldState::default(),
        };
        arena.reset();
        arena
    }

    pub fn reset(&mut self) {
        let spawn = |x: f32, facing_left: bool| CombatantState {
            x,
            y: GROUND_Y,
            health: START_HEALTH,
            facing_left,
            ..Default::default()
        };

        self.state = WorldState {
            combatants: [spawn(200.0, false), spawn(600.0, true)],
            pickups: vec![Pickup {
                x: ARENA_WIDTH / 2.0,
                y: GROUND_Y,
                kind: "fire".to_string(),
            }],
            ..Default::default()
        };
    }

    pub fn snapshot(&self) -> WorldState {
        self.state.clone()
    }

    pub fn step(&mut self, inputs: [InputFlags; 2], dt: f32) {
        self.state.game_time += dt;

        for (index, input) in inputs.iter().enumerate() {
            let combatant = &mut self.state.combatants[index];
            combatant.vx = 0.0;
            if input.contains(InputFlags::LEFT) {
                combatant.vx = -MOVE_SPEED;
                combatant.facing_left = true;
            }
            if input.contains(InputFlags::RIGHT) {
                combatant.vx = MOVE_SPEED;
                combatant.facing_left = false;
            }
            if input.contains(InputFlags::JUMP) && combatant.y >= GROUND_Y {
                combatant.vy = JUMP_SPEED;
            }

            combatant.vy += GRAVITY * dt;
            combatant.x = (combatant.x + combatant.vx * dt).clamp(0.0, ARENA_WIDTH);
            combatant.y = (combatant.y + combatant.vy * dt).min(GROUND_Y);
            if combatant.y >= GROUND_Y {
                combatant.vy = 0.0;
            }

            combatant.attack_cooldown = (combatant.attack_cooldown - 1).max(0);
            if input.contains(InputFlags::ATTACK) && combatant.attack_cooldown == 0 {
                combatant.attack_cooldown = ATTACK_COOLDOWN_TICKS;
                let direction = if combatant.facing_left { -1.0 } else { 1.0 };
                self.state.projectiles.push(Projectile {
                    x: combatant.x,
                    y: combatant.y,
                    vx: PROJECTILE_SPEED * direction,
                    vy: 0.0,
                    owner: index as u8,
                    kind: "bolt".to_string(),
                });
            }
        }

        self.step_projectiles(dt);
    }

    fn step_projectiles(&mut self, dt: f32) {
        let combatants = &mut self.state.combatants;
        self.state.projectiles.retain_mut(|projectile| {
            projectile.x += projectile.vx * dt;
            let target = &mut combatants[1 - projectile.owner as usize];
            if (target.x - projectile.x).abs() < 16.0 && (target.y - projectile.y).abs() < 32.0 {
                target.health = (target.health - HIT_DAMAGE).max(0);
                return false;
            }
            (0.0..=ARENA_WIDTH).contains(&projectile.x)
        });
    }

    pub fn knocked_out(&self) -> bool {
        self.state.combatants.iter().any(|c| c.health == 0)
    }

    pub fn leader(&self) -> Winner {
        let [first, second] = &self.state.combatants;
        match first.health.cmp(&second.health) {
            std::cmp::Ordering::Greater => Winner::First,
            std::cmp::Ordering::Less => Winner::Second,
            std::cmp::Ordering::Equal => Winner::None,
        }
    }
}

/// Deterministic input pattern standing in for a keyboard.
pub fn scripted_input(tick: u64) -> InputFlags {
    let mut input = if (tick / 90) % 2 == 0 {
        InputFlags::LEFT
    } else {
        InputFlags::RIGHT
    };
    if tick % 120 == 0 {
        input |= InputFlags::JUMP;
    }
    if tick % 45 == 0 {
        input |= InputFlags::ATTACK;
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_spawns_projectile_and_cooldown() {
        let mut arena = Arena::new();
        arena.step([InputFlags::ATTACK, InputFlags::empty()], 1.0 / 60.0);
        assert_eq!(arena.snapshot().projectiles.len(), 1);

        arena.step([InputFlags::ATTACK, InputFlags::empty()], 1.0 / 60.0);
        assert_eq!(arena.snapshot().projectiles.len(), 1);
        assert_eq!(arena.snapshot().combatants[0].attack_cooldown, ATTACK_COOLDOWN_TICKS - 1);
    }

    #[test]
    fn test_projectile_hits_opponent() {
        let mut arena = Arena::new();
        arena.step([InputFlags::ATTACK, InputFlags::empty()], 1.0 / 60.0);
        for _ in 0..120 {
            arena.step([InputFlags::empty(); 2], 1.0 / 60.0);
        }

        let snapshot = arena.snapshot();
        assert_eq!(snapshot.combatants[1].health, START_HEALTH - HIT_DAMAGE);
        assert!(snapshot.projectiles.is_empty());
        assert_eq!(arena.leader(), Winner::First);
    }
}
