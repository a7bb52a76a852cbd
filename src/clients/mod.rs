pub mod adapter;
pub mod health;
pub mod provider;
pub mod queue;
pub mod rbmq;
pub mod registry;
