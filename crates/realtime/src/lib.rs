mod client;

pub use remi_realtime_types as types;

pub use client::{connect, connect_with_config, Client, Config, RealtimeApi, ServerRx};
