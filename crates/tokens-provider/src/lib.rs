//! Provider side of the tokens relation.
//!
//! A provider unit reads credential requests published by every requirer
//! unit it is related to and publishes the tokens it decided to issue.
//! Deciding *whether* to issue, and generating the token itself, belong to
//! the caller; this crate handles the bookkeeping around it:
//!
//! - [`RequestRegistry`] aggregates peer requests into a deterministic list
//!   of [`RequestEntry`](tokens_types::RequestEntry) values;
//! - [`TokenLedger`] maintains this unit's published `tokens` map per
//!   relation instance, merging newly issued tokens and pruning tokens that
//!   nobody requests any more;
//! - [`TokensProvider`] bundles both behind the endpoint-level API.
//!
//! Every operation re-reads the store. Issue and prune are idempotent, so
//! they can safely run on every dispatched event.

mod ledger;
mod provider;
mod registry;

pub use ledger::{LedgerOutcome, PruneReport, TokenLedger};
pub use provider::TokensProvider;
pub use registry::RequestRegistry;
