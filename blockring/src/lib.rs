//! Zero-copy single-producer/single-consumer ring of fixed-size byte slots.
//!
//! See [`ring`] for the endpoint API and [`sync`] for the bounded semaphore
//! that paces the two sides.

pub mod config;
pub mod ring;
pub mod sync;
mod trace;

pub use config::{ConfigError, RingConfig};
pub use ring::{Consumer, Producer, ReadSlot, RingError, WriteSlot, create, create_with};
pub use sync::{BoundedSemaphore, SemaphoreError, Timeout};
pub use trace::init_tracing;
