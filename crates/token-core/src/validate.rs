//! Input validation. Pure functions, no network access.
//!
//! Every failure is a [`TokenError::Validation`] naming the offending field.

use chain_sol::{Pubkey, MAX_DECIMALS};

use crate::amount::UiAmount;
use crate::error::TokenError;
use crate::types::{CreateRequest, MovementRequest, OperationRequest, RawRequest};

pub const MAX_SYMBOL_LEN: usize = 10;
pub const MAX_NAME_LEN: usize = 32;

pub fn validate_address(field: &str, input: &str) -> Result<Pubkey, TokenError> {
    let s = required(field, input)?;
    s.parse::<Pubkey>()
        .map_err(|e| TokenError::validation(field, e.to_string()))
}

/// A strictly positive amount.
pub fn validate_amount(field: &str, input: &str) -> Result<UiAmount, TokenError> {
    let amount = parse_amount(field, input)?;
    if amount.is_zero() {
        return Err(TokenError::validation(field, "must be greater than zero"));
    }
    Ok(amount)
}

/// An integer in `[0, 18]`.
pub fn validate_decimals(field: &str, input: &str) -> Result<u8, TokenError> {
    let s = required(field, input)?;
    let decimals: u8 = s
        .parse()
        .map_err(|_| TokenError::validation(field, format!("'{s}' is not an integer")))?;
    if decimals > MAX_DECIMALS {
        return Err(TokenError::validation(
            field,
            format!("must be between 0 and {MAX_DECIMALS}, got {decimals}"),
        ));
    }
    Ok(decimals)
}

pub fn validate_create(
    name: &str,
    symbol: &str,
    decimals: &str,
    initial_supply: &str,
    description: Option<&str>,
) -> Result<CreateRequest, TokenError> {
    let name = required("name", name)?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(TokenError::validation(
            "name",
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }

    let symbol = required("symbol", symbol)?;
    if symbol.chars().count() > MAX_SYMBOL_LEN {
        return Err(TokenError::validation(
            "symbol",
            format!("must be at most {MAX_SYMBOL_LEN} characters"),
        ));
    }

    let decimals = validate_decimals("decimals", decimals)?;
    // Zero supply is allowed: the mint is created empty.
    let initial_supply = parse_amount("initial_supply", initial_supply)?;
    let raw = initial_supply
        .to_raw(decimals)
        .map_err(|e| retag(e, "initial_supply"))?;
    if raw == 0 && !initial_supply.is_zero() {
        return Err(TokenError::validation(
            "initial_supply",
            format!("{initial_supply} is below the smallest unit at {decimals} decimals"),
        ));
    }

    Ok(CreateRequest {
        name: name.to_string(),
        symbol: symbol.to_uppercase(),
        decimals,
        initial_supply,
        description: description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
    })
}

pub fn validate_movement(
    mint: &str,
    recipient: &str,
    amount: &str,
    decimals: Option<&str>,
) -> Result<MovementRequest, TokenError> {
    Ok(MovementRequest {
        mint: validate_address("mint", mint)?,
        recipient: validate_address("recipient", recipient)?,
        amount: validate_amount("amount", amount)?,
        decimals: decimals
            .map(|d| validate_decimals("decimals", d))
            .transpose()?,
    })
}

/// Validate a raw request into an [`OperationRequest`].
pub fn validate_request(raw: &RawRequest) -> Result<OperationRequest, TokenError> {
    match raw {
        RawRequest::Create {
            name,
            symbol,
            decimals,
            initial_supply,
            description,
        } => validate_create(name, symbol, decimals, initial_supply, description.as_deref())
            .map(OperationRequest::Create),
        RawRequest::MintTo {
            mint,
            recipient,
            amount,
            decimals,
        } => validate_movement(mint, recipient, amount, decimals.as_deref())
            .map(OperationRequest::MintTo),
        RawRequest::Transfer {
            mint,
            recipient,
            amount,
            decimals,
        } => validate_movement(mint, recipient, amount, decimals.as_deref())
            .map(OperationRequest::Transfer),
    }
}

fn required<'a>(field: &str, input: &'a str) -> Result<&'a str, TokenError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(TokenError::validation(field, "is required"));
    }
    Ok(s)
}

fn parse_amount(field: &str, input: &str) -> Result<UiAmount, TokenError> {
    UiAmount::parse(input).map_err(|e| retag(e, field))
}

/// Point an amount error at the caller's field name.
fn retag(err: TokenError, field: &str) -> TokenError {
    match err {
        TokenError::Validation { reason, .. } => TokenError::validation(field, reason),
        other => other,
    }
}
