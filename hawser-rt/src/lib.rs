//! # Hawser RT - Executor Builder
//!
//! `hawser-rt` provides a small builder over the tokio multi-thread runtime
//! for programs using the hawser networking framework.
//!
//! ## Features
//!
//! - **Worker pool sizing**: choose the number of executor threads
//! - **CPU pinning**: pin worker threads to specific CPU cores
//! - **Thread naming**: name executor threads for debugging
//! - **Task management**: spawn, detach, and cancel tasks
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! hawser-rt = "0.2"
//! ```
//!
//! ```rust,no_run
//! use hawser_rt::ExecutorBuilder;
//!
//! ExecutorBuilder::new()
//!     .name("net")
//!     .workers(4)
//!     .run(async {
//!         println!("running on a 4-thread executor");
//!     });
//! ```
//!
//! ## CPU Pinning
//!
//! ```rust,no_run
//! use hawser_rt::ExecutorBuilder;
//! use core_affinity::CoreId;
//!
//! ExecutorBuilder::new()
//!     .name("net")
//!     .core_ids(vec![CoreId { id: 0 }, CoreId { id: 1 }])
//!     .run(async {
//!         println!("workers pinned to cores 0 and 1");
//!     });
//! ```
//!
//! ## Spawning Tasks
//!
//! ```rust,no_run
//! use hawser_rt::{ExecutorBuilder, spawn};
//!
//! ExecutorBuilder::new().run(async {
//!     let task = spawn(async { 42 });
//!     assert_eq!(task.await.unwrap(), 42);
//! });
//! ```

#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

mod tokio_rt;

pub use tokio_rt::{spawn, yield_now, ExecutorBuilder, Task, TaskError};
