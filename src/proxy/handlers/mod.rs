// Handlers module - proxy endpoint handlers

pub mod debug;
pub mod forward;
