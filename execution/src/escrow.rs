//! Settlement of a game's escrow into payable balances.
//!
//! Every rule zeroes the deposits it draws on before booking the payout against custody, and the
//! resulting [Payout]s are credited by the ledger in the same commit as the game record.

use commonware_cryptography::ed25519::PublicKey;
use qchess_types::{Escrow, GameError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payout {
    pub recipient: PublicKey,
    pub amount: u64,
}

/// Pay the whole pool to `winner`.
pub fn award(escrow: &mut Escrow, winner: &PublicKey) -> Result<Vec<Payout>, GameError> {
    let pool = escrow.take_all();
    escrow.payout(pool)?;
    Ok(vec![Payout {
        recipient: winner.clone(),
        amount: pool,
    }])
}

/// Split the pool evenly. An odd unit goes to `initiator`, the participant who called the draw.
pub fn split(
    escrow: &mut Escrow,
    initiator: &PublicKey,
    other: &PublicKey,
) -> Result<Vec<Payout>, GameError> {
    let pool = escrow.take_all();
    let half = pool / 2;
    let remainder = pool % 2;
    escrow.payout(pool)?;
    Ok([(initiator, half + remainder), (other, half)]
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .map(|(recipient, amount)| Payout {
            recipient: recipient.clone(),
            amount,
        })
        .collect())
}

/// Return the creator's own deposit.
pub fn refund(escrow: &mut Escrow, creator: &PublicKey) -> Result<Vec<Payout>, GameError> {
    let amount = escrow.take_deposit(creator);
    escrow.payout(amount)?;
    if amount == 0 {
        return Ok(Vec::new());
    }
    Ok(vec![Payout {
        recipient: creator.clone(),
        amount,
    }])
}
