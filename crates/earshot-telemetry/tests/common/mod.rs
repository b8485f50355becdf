//! A scripted game server for telemetry tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use earshot_telemetry::parse::NOT_FOUND;
use earshot_telemetry::{GameChannel, TelemetryError};

#[derive(Default)]
struct World {
    online: Vec<String>,
    positions: HashMap<String, [f64; 3]>,
    rotations: HashMap<String, [f64; 2]>,
    fail_on: Option<String>,
    calls: Vec<String>,
}

/// Answers `list` and `data get entity` the way a vanilla server does.
#[derive(Default)]
pub struct FakeGame {
    world: Mutex<World>,
}

impl FakeGame {
    pub fn set_online(&self, names: &[&str]) {
        self.world.lock().unwrap().online = names.iter().map(|n| n.to_string()).collect();
    }

    pub fn place(&self, name: &str, x: f64, y: f64, z: f64) {
        let mut world = self.world.lock().unwrap();
        world.positions.insert(name.into(), [x, y, z]);
        world.rotations.entry(name.into()).or_insert([0.0, 0.0]);
    }

    pub fn face(&self, name: &str, yaw: f64, pitch: f64) {
        self.world.lock().unwrap().rotations.insert(name.into(), [yaw, pitch]);
    }

    /// Forgets where `name` is, so entity queries answer "not found".
    pub fn vanish(&self, name: &str) {
        let mut world = self.world.lock().unwrap();
        world.positions.remove(name);
        world.rotations.remove(name);
    }

    /// Makes any command containing `pattern` fail.
    pub fn fail_on(&self, pattern: Option<&str>) {
        self.world.lock().unwrap().fail_on = pattern.map(str::to_owned);
    }

    pub fn calls(&self) -> Vec<String> {
        self.world.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.world.lock().unwrap().calls.clear();
    }
}

impl GameChannel for FakeGame {
    async fn execute(&self, command: &str) -> Result<String, TelemetryError> {
        let mut world = self.world.lock().unwrap();
        world.calls.push(command.to_owned());

        if world.fail_on.as_deref().is_some_and(|p| command.contains(p)) {
            return Err(TelemetryError::Io(std::sync::Arc::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "scripted failure",
            ))));
        }

        if command == "list" {
            return Ok(format!(
                "There are {} of a max of 20 players online: {}",
                world.online.len(),
                world.online.join(", ")
            ));
        }

        let Some((name, field)) = command
            .strip_prefix("data get entity ")
            .and_then(|rest| rest.rsplit_once(' '))
        else {
            return Ok("Unknown or incomplete command, see below for error".into());
        };

        let reply = match field {
            "Pos" => world
                .positions
                .get(name)
                .map(|[x, y, z]| format!("{name} has the following entity data: [{x}d, {y}d, {z}d]")),
            "Rotation" => world
                .rotations
                .get(name)
                .map(|[yaw, pitch]| format!("{name} has the following entity data: [{yaw}f, {pitch}f]")),
            _ => None,
        };
        Ok(reply.unwrap_or_else(|| NOT_FOUND.to_owned()))
    }
}
