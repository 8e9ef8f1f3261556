pub mod cooldown;
pub mod counter;
pub mod history;
pub mod redis_store;
