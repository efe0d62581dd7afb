//! Agent Desk Runtime
//!
//! The [`Dispatcher`] turns one validated query into one aggregated response
//! document. Each dispatch is independent: it looks up the persona, starts a
//! streamed run and concatenates fragments in arrival order. Failures while
//! streaming stop at this boundary as an [`ExecutionError`].

pub mod dispatcher;

pub use dispatcher::*;
