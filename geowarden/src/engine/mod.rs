pub mod cooldown;
pub mod dispatcher;
pub mod fraud;
