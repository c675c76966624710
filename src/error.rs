//! Public Error Taxonomy
//!
//! Every failure of the five public operations maps to exactly one of these
//! variants. The set is closed; embedding layers can rely on `code()` for
//! stable machine-readable identifiers.

use thiserror::Error;

/// Errors surfaced to API callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    // === Validation Errors ===
    #[error("Wrong arguments")]
    WrongArguments,

    // === Account Errors ===
    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User does not exist")]
    UserDoesNotExist,

    #[error("Sender not found")]
    SenderNotFound,

    #[error("Receiver not found")]
    ReceiverNotFound,

    #[error("Not enough funds")]
    NotEnoughFunds,

    // === Admission Errors ===
    #[error("Too many requests to user")]
    TooManyRequestsToUser,

    // === System Errors ===
    #[error("Unexpected internal failure")]
    Unexpected,
}

impl BankError {
    /// Get the stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            BankError::WrongArguments => "WRONG_ARGUMENTS",
            BankError::UserAlreadyExists => "USER_ALREADY_EXISTS",
            BankError::UserDoesNotExist => "USER_DOES_NOT_EXIST",
            BankError::SenderNotFound => "SENDER_NOT_FOUND",
            BankError::ReceiverNotFound => "RECEIVER_NOT_FOUND",
            BankError::NotEnoughFunds => "NOT_ENOUGH_FUNDS",
            BankError::TooManyRequestsToUser => "TOO_MANY_REQUESTS_TO_USER",
            BankError::Unexpected => "UNEXPECTED",
        }
    }
}
