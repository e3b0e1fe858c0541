// Pipeline configuration
pub mod config;

// Typed pipeline errors
pub mod error;

// Console and per-task tracing
pub mod logging;

// Bounded concurrent retries
pub mod retry_pool;

// In-memory task store
pub mod registry;

// Status and stage messages
pub mod messages;

// Design tree pruning and partitioning
pub mod partition;

// Code and JSON extraction from model replies
pub mod reply;

// Stage graph engine
pub mod workflow;

// Figma, generator, tool-chain, evaluator and packaging backends
pub mod collaborators;

// Stage bodies
pub mod stages;

// Task submission surface
pub mod service;

// Command-line interface
pub mod cli;
