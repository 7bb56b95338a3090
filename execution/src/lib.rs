//! qchess execution layer.
//!
//! This crate contains the deterministic game logic ([machine], [quantum], [resolver],
//! [escrow]) and the [Ledger] service that serializes operations per game and commits them to a
//! [State] store.
//!
//! ## Determinism requirements
//! - Do not use wall-clock time inside execution; callers pass `now` in.
//! - Do not generate randomness; collapses are driven by caller-supplied seeds, and forced
//!   collapses derive their seed from the game's move count.
//! - Avoid iteration order of hash-based collections influencing outputs.
//!
//! ## Minimal game (example)
//! ```rust,ignore
//! use qchess_execution::{mocks::{create_account_keypair, MockTreasury}, Ledger, LedgerConfig, Memory};
//!
//! # async fn example() -> Result<(), qchess_execution::LedgerError> {
//! let ledger = Ledger::new(LedgerConfig::default(), Memory::default(), MockTreasury::default(), ());
//! let (_, alice) = create_account_keypair(1);
//! let (_, bob) = create_account_keypair(2);
//! ledger.create_game(&alice, 100, 300, 0).await?;
//! ledger.join_game(0, &bob, 100, 1).await?;
//! # Ok(())
//! # }
//! ```

pub mod escrow;
pub mod ledger;
pub mod machine;
pub mod quantum;
pub mod resolver;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod concurrency_tests;

mod state;

pub use ledger::{EventSink, Ledger, LedgerConfig, LedgerError, TracingSink, TransferError, Treasury};
pub use machine::{Rules, RulesError};
pub use state::{nonce, Memory, State, Status};
