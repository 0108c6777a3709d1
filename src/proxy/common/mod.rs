// Common utilities shared by the proxy pipeline

pub mod body;
