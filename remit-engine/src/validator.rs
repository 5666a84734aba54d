use rust_decimal::Decimal;

use remit_config::WithdrawalPolicy;
use remit_core::{is_whole_units, Amount, BankTransferDetails, MobileBankingDetails, PaymentDetails};

use crate::{WithdrawalError, WithdrawalResult};

/// Field-level checks applied before a request is admitted.
///
/// Checks run in a fixed order and the first failure wins: presence,
/// then amount, then per-field shape. Eligibility and the transactional
/// guards live in the service and the store respectively.
pub struct RequestValidator<'a> {
    policy: &'a WithdrawalPolicy,
}

impl<'a> RequestValidator<'a> {
    pub fn new(policy: &'a WithdrawalPolicy) -> Self {
        Self { policy }
    }

    pub fn validate(&self, amount: Amount, details: &PaymentDetails) -> WithdrawalResult<()> {
        self.check_presence(details)?;
        self.check_amount(amount)?;
        self.check_shape(details)
    }

    /// Presence and shape only; used when editing the destination of an
    /// already-admitted request.
    pub fn validate_details(&self, details: &PaymentDetails) -> WithdrawalResult<()> {
        self.check_presence(details)?;
        self.check_shape(details)
    }

    fn check_presence(&self, details: &PaymentDetails) -> WithdrawalResult<()> {
        match details {
            PaymentDetails::MobileBanking(MobileBankingDetails {
                provider,
                mobile_number,
                account_holder,
            }) => {
                if is_blank(provider) || is_blank(mobile_number) || is_blank(account_holder) {
                    return Err(WithdrawalError::MissingMobileBankingDetails);
                }
            }
            PaymentDetails::BankTransfer(BankTransferDetails {
                bank_name,
                account_number,
                account_name,
            }) => {
                if is_blank(bank_name) || is_blank(account_number) || is_blank(account_name) {
                    return Err(WithdrawalError::MissingBankTransferDetails);
                }
            }
        }
        Ok(())
    }

    fn check_amount(&self, amount: Amount) -> WithdrawalResult<()> {
        if amount <= Decimal::ZERO || !is_whole_units(amount) || amount < self.policy.min_amount {
            return Err(WithdrawalError::InvalidAmount { amount });
        }
        Ok(())
    }

    fn check_shape(&self, details: &PaymentDetails) -> WithdrawalResult<()> {
        match details {
            PaymentDetails::MobileBanking(mobile) => self.check_mobile(mobile),
            PaymentDetails::BankTransfer(bank) => self.check_bank(bank),
        }
    }

    fn check_mobile(&self, details: &MobileBankingDetails) -> WithdrawalResult<()> {
        if !self.policy.supports_provider(&details.provider) {
            return Err(WithdrawalError::InvalidProvider(details.provider.clone()));
        }
        if !is_valid_mobile_number(&details.mobile_number) {
            return Err(WithdrawalError::InvalidMobileNumber);
        }
        if details.account_holder.trim().len() < self.policy.min_name_len {
            return Err(WithdrawalError::InvalidAccountHolderName);
        }
        Ok(())
    }

    fn check_bank(&self, details: &BankTransferDetails) -> WithdrawalResult<()> {
        if details.bank_name.trim().len() < self.policy.min_name_len {
            return Err(WithdrawalError::InvalidBankName);
        }
        let number = details.account_number.trim();
        if !number.bytes().all(|b| b.is_ascii_digit())
            || number.len() < self.policy.account_number_min_len
            || number.len() > self.policy.account_number_max_len
        {
            return Err(WithdrawalError::InvalidAccountNumber);
        }
        if details.account_name.trim().len() < self.policy.min_name_len {
            return Err(WithdrawalError::InvalidAccountName);
        }
        Ok(())
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// National mobile numbering plan: 11 digits, operator prefix 013-019.
fn is_valid_mobile_number(raw: &str) -> bool {
    let number = raw.trim();
    number.len() == 11
        && number.bytes().all(|b| b.is_ascii_digit())
        && number.starts_with("01")
        && matches!(number.as_bytes()[2], b'3'..=b'9')
}
