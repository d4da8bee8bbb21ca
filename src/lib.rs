#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
pub mod checkpoint;
mod core;
mod engine;
mod error;
pub mod flow;
pub mod frame;
mod graph;
mod param;
mod runner;
pub mod source;
pub mod storage;
pub mod config;
mod utils;

pub use crate::blueprint::{Blueprint, CheckpointBinder, TaskBinder, TaskDef};
pub use crate::checkpoint::{CheckpointCache, CheckpointStore, DiskStore, MemoryStore};
pub use crate::core::{Mode, RunContext, TaskContext};
pub use crate::engine::{Dependencies, GraphId, Handle, InputRef, TaskHandle};
pub use crate::error::*;
pub use crate::graph::Graph;
pub use crate::param::{Param, ParamSnapshot, ParameterStore};
pub use crate::runner::{Engine, Outputs, TaskReport, TaskStatus};

#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
