//! Argument parsing and the arithmetic rules of a transfer.
//!
//! Everything here runs before any write is attempted, so a rejected call
//! never reaches the store.

use tally_types::{Account, Credential, Username};

use crate::error::{LedgerError, LedgerResult};

pub fn parse_username(raw: &str) -> LedgerResult<Username> {
    Username::parse(raw).map_err(|e| LedgerError::InvalidInput(format!("username: {e}")))
}

pub fn parse_credential(raw: &str) -> LedgerResult<Credential> {
    Credential::new(raw).map_err(|e| LedgerError::InvalidInput(format!("credential: {e}")))
}

/// Transfer amounts are strictly positive.
pub fn check_amount(amount: i64) -> LedgerResult<()> {
    if amount <= 0 {
        return Err(LedgerError::InvalidInput(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

pub fn check_distinct(from: &Username, to: &Username) -> LedgerResult<()> {
    if from == to {
        return Err(LedgerError::InvalidInput(
            "cannot transfer to the same account".into(),
        ));
    }
    Ok(())
}

/// Apply a transfer to in-memory copies of both accounts.
///
/// Returns whether the sender was debited. On error neither account is
/// modified.
pub fn apply_transfer(sender: &mut Account, recipient: &mut Account, amount: i64) -> LedgerResult<bool> {
    let debited = !sender.has_unlimited_funds();
    let sender_after = if debited {
        if sender.tokens < amount {
            return Err(LedgerError::InsufficientFunds {
                username: sender.username.clone(),
                available: sender.tokens,
                requested: amount,
            });
        }
        sender.tokens - amount
    } else {
        sender.tokens
    };
    let recipient_after = recipient.tokens.checked_add(amount).ok_or_else(|| {
        LedgerError::Overflow(format!(
            "crediting {amount} would overflow {}'s holdings",
            recipient.username
        ))
    })?;
    sender.tokens = sender_after;
    recipient.tokens = recipient_after;
    Ok(debited)
}

/// Post-condition on records about to be written.
pub fn ensure_consistent(account: &Account) -> LedgerResult<()> {
    if account.tokens < 0 && !account.is_admin {
        return Err(LedgerError::Internal(format!(
            "refusing to write negative holdings for {}",
            account.username
        )));
    }
    Ok(())
}
