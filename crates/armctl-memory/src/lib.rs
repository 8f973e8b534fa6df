//! `armctl-memory` – persistence for recorded motion.
//!
//! Named sequences and named Cartesian points survive restarts in a local
//! SQLite file.
//!
//! # Modules
//!
//! - [`library`] – [`MotionLibrary`][library::MotionLibrary]: key-value
//!   style get/put/list/delete over sequences and points.

pub mod library;

pub use library::{LibraryError, MotionLibrary, SavedPoint};
