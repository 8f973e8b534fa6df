//! `armctl-middleware` – plumbing between the engine and the arm.
//!
//! Routes asynchronous data between the synchronizer, the dispatcher and
//! whatever actually moves the servos, without caring what the poses mean.
//!
//! # Modules
//!
//! - [`bus`] – Topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`adapter`] – The [`ActuationService`] trait every remote actuation
//!   backend implements.
//! - [`frames`] – JSON line frames spoken by the servo controller.
//! - [`loopback`] – [`LoopbackActuator`]: an in-process backend that
//!   publishes frames onto the bus and can echo state like real hardware.

pub mod adapter;
pub mod bus;
pub mod frames;
pub mod loopback;

pub use adapter::ActuationService;
pub use bus::{EventBus, Topic, TopicReceiver};
pub use loopback::LoopbackActuator;
