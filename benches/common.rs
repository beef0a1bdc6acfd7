#![allow(dead_code)]

use colonnade::engine::error::ECSResult;
use colonnade::engine::storage::Storage;

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;
pub const AGENTS_LARGE: usize = 1_000_000;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}

/// Storage with `agent_count` agents owning all three components.
pub fn populated_storage(agent_count: usize) -> ECSResult<Storage> {
    let mut storage = Storage::with_capacity(agent_count);
    for i in 0..agent_count {
        storage.new_entity((
            Position { x: 0.0, y: 0.0 },
            Wealth { value: 100.0 },
            Productivity { rate: 1.0 + (i % 7) as f32 * 0.1 },
        ))?;
    }
    Ok(storage)
}
