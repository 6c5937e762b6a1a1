//! Requirer side of the tokens relation.
//!
//! A requirer unit publishes the identities it needs credentials for and
//! polls the tokens its provider published in return. [`TokensRequirer`]
//! is the client API; [`ReadinessEvaluator`] turns the current store
//! contents into a [`Readiness`] value the caller can surface to operators
//! as a blocked or waiting condition.
//!
//! Nothing here is persisted between calls. Every answer is recomputed
//! from the store at the time of the call, so the caller simply asks again
//! whenever its event dispatcher fires.

mod client;
mod evaluator;
mod readiness;

pub use client::TokensRequirer;
pub use evaluator::ReadinessEvaluator;
pub use readiness::Readiness;
