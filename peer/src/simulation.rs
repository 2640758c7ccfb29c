//! Fixed-rate simulation loop
//!
//! Runs on its own task next to the token ring. It shares the world with the
//! hand-off through the same write lock, so a hand-off always sees the world
//! between two ticks, never during one.

use crate::world::{ChangeSource, World};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Issues random move orders for the local player's idle creatures so a
/// headless peer produces local changes.
pub struct Autopilot {
    rng: StdRng,
    every: u64,
}

impl Autopilot {
    pub fn new(seed: u64, every: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            every: every.max(1),
        }
    }

    /// Orders every idle own creature somewhere new. Returns orders issued.
    pub fn drive(&mut self, world: &mut World) -> usize {
        if world.current_tick() % self.every != 0 {
            return 0;
        }

        let width = world.grid().width() as i32;
        let height = world.grid().height() as i32;
        let idle: Vec<u32> = world
            .own_creatures()
            .filter(|c| c.path_target().is_none())
            .map(|c| c.id)
            .collect();

        for &id in &idle {
            let x = self.rng.gen_range(0..width);
            let y = self.rng.gen_range(0..height);
            world.order_move(id, x, y);
        }
        idle.len()
    }
}

/// Advances the world at `tick_rate` ticks per second until the task is dropped
pub async fn run_simulation_loop(
    world: Arc<RwLock<World>>,
    tick_rate: u32,
    mut autopilot: Option<Autopilot>,
) {
    let tick_duration = Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1)));
    let mut interval_timer = interval(tick_duration);
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    interval_timer.tick().await;

    loop {
        interval_timer.tick().await;
        let started = Instant::now();

        let tick = {
            let mut world = world.write().await;
            let tick = world.advance();
            if let Some(autopilot) = autopilot.as_mut() {
                let orders = autopilot.drive(&mut world);
                if orders > 0 {
                    debug!("Autopilot issued {} orders at tick {}", orders, tick);
                }
            }
            tick
        };

        let elapsed = started.elapsed();
        if elapsed > tick_duration {
            warn!(
                "Tick {} took {:.3}s, longer than the {:.3}s tick budget",
                tick,
                elapsed.as_secs_f32(),
                tick_duration.as_secs_f32()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::Creature;
    use shared::{TerrainType, TileGrid};

    fn test_world() -> World {
        let mut world = World::new(TileGrid::new(10, 10, TerrainType::Plain), 1);
        world.spawn_creature(Creature::new(101, 1, 0, 0));
        world.spawn_creature(Creature::new(102, 1, 5, 5));
        world.spawn_creature(Creature::new(201, 2, 9, 9));
        world
    }

    #[test]
    fn test_autopilot_orders_own_idle_creatures() {
        let mut world = test_world();
        let mut autopilot = Autopilot::new(1, 5);

        assert_eq!(autopilot.drive(&mut world), 2);
        let orders = world.drain_local_changes();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|c| c.player_id == 1));
        assert!(orders.iter().all(|c| c.creature_id != 201));
    }

    #[test]
    fn test_autopilot_respects_interval() {
        let mut world = test_world();
        let mut autopilot = Autopilot::new(1, 5);

        world.advance();
        assert_eq!(autopilot.drive(&mut world), 0);
        assert_eq!(world.pending_len(), 0);
    }

    #[test]
    fn test_autopilot_is_seeded() {
        let mut a = test_world();
        let mut b = test_world();

        Autopilot::new(42, 1).drive(&mut a);
        Autopilot::new(42, 1).drive(&mut b);

        assert_eq!(a.drain_local_changes(), b.drain_local_changes());
    }

    #[tokio::test]
    async fn test_simulation_loop_advances_ticks() {
        let world = Arc::new(RwLock::new(test_world()));
        let handle = tokio::spawn(run_simulation_loop(Arc::clone(&world), 200, None));

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(world.read().await.current_tick() > 0);
    }
}
