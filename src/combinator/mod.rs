//! Higher-order combinators built on spawn, deferreds, and the halt
//! cascade. Nothing in here touches kernel internals: each combinator is an
//! ordinary operation that supervises its contestants in a task of its own.

pub mod all;
pub mod race;
pub mod timeout;

pub use all::all;
pub use race::race;
pub use timeout::with_timeout;
