pub mod broker;
pub mod clickhouse;
pub mod domain;
pub mod nats;
pub mod postgres;
pub mod queue;
pub mod telemetry;
