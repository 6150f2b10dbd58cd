//! Provider endpoints and their request rules.

use std::{fmt, str::FromStr};

use crate::error::MpesaError;

/// Phone numbers in international format without the leading `+`.
const MSISDN: &str = "required | regex(/^254\\d{9}$/)({label} must be a 254XXXXXXXXX number)";

const AMOUNT: &str = "required | number | greater_than(0)";

const SHORT_CODE: &str = "required | integer";

/// A transaction endpoint of the provider API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// Lipa na M-Pesa Online (STK push) payment request.
    StkPush,
    /// Status of an STK push, by `CheckoutRequestID`.
    StkStatusQuery,
    /// Business to customer payment.
    B2c,
    /// Business to business payment.
    B2b,
    /// Registration of C2B confirmation and validation URLs.
    C2bRegister,
    /// Simulated customer payment (sandbox only).
    C2bSimulate,
    /// Short code balance query.
    AccountBalance,
    /// Status of a completed transaction.
    TransactionStatus,
    /// Reversal of a completed transaction.
    Reversal,
}

impl Endpoint {
    /// Every endpoint, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::StkPush,
        Self::StkStatusQuery,
        Self::B2c,
        Self::B2b,
        Self::C2bRegister,
        Self::C2bSimulate,
        Self::AccountBalance,
        Self::TransactionStatus,
        Self::Reversal,
    ];

    /// Request path relative to the base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::StkPush => "/mpesa/stkpush/v1/processrequest",
            Self::StkStatusQuery => "/mpesa/stkpushquery/v1/query",
            Self::B2c => "/mpesa/b2c/v1/paymentrequest",
            Self::B2b => "/mpesa/b2b/v1/paymentrequest",
            Self::C2bRegister => "/mpesa/c2b/v1/registerurl",
            Self::C2bSimulate => "/mpesa/c2b/v1/simulate",
            Self::AccountBalance => "/mpesa/accountbalance/v1/query",
            Self::TransactionStatus => "/mpesa/transactionstatus/v1/query",
            Self::Reversal => "/mpesa/reversal/v1/request",
        }
    }

    /// Snake-case name, also accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::StkPush => "stk_push",
            Self::StkStatusQuery => "stk_status",
            Self::B2c => "b2c",
            Self::B2b => "b2b",
            Self::C2bRegister => "c2b_register",
            Self::C2bSimulate => "c2b_simulate",
            Self::AccountBalance => "account_balance",
            Self::TransactionStatus => "transaction_status",
            Self::Reversal => "reversal",
        }
    }

    /// Config section holding this endpoint's defaults.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::StkPush | Self::StkStatusQuery => "lnmo",
            Self::B2c => "b2c",
            Self::B2b => "b2b",
            Self::C2bRegister | Self::C2bSimulate => "c2b",
            Self::AccountBalance => "account_balance",
            Self::TransactionStatus => "transaction_status",
            Self::Reversal => "reversal",
        }
    }

    /// Built-in validation rules, as `(selector, rules)` pairs.
    #[must_use]
    pub const fn rules(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::StkPush => &[
                ("BusinessShortCode", SHORT_CODE),
                ("Password", "required"),
                ("Timestamp", "required | length(14)"),
                (
                    "TransactionType",
                    "required | in_list(CustomerPayBillOnline,CustomerBuyGoodsOnline)",
                ),
                ("Amount", AMOUNT),
                ("PartyA", MSISDN),
                ("PartyB", SHORT_CODE),
                ("PhoneNumber", MSISDN),
                ("CallBackURL", "required | url"),
                ("AccountReference", "required"),
                ("TransactionDesc", "required"),
            ],
            Self::StkStatusQuery => &[
                ("BusinessShortCode", SHORT_CODE),
                ("Password", "required"),
                ("Timestamp", "required | length(14)"),
                ("CheckoutRequestID", "required"),
            ],
            Self::B2c => &[
                ("InitiatorName", "required"),
                ("SecurityCredential", "required"),
                (
                    "CommandID",
                    "required | in_list(SalaryPayment,BusinessPayment,PromotionPayment)",
                ),
                ("Amount", AMOUNT),
                ("PartyA", SHORT_CODE),
                ("PartyB", MSISDN),
                ("Remarks", "required"),
                ("QueueTimeOutURL", "required | url"),
                ("ResultURL", "required | url"),
            ],
            Self::B2b => &[
                ("Initiator", "required"),
                ("SecurityCredential", "required"),
                ("CommandID", "required"),
                ("SenderIdentifierType", "required | in_list(1,2,4)"),
                ("RecieverIdentifierType", "required | in_list(1,2,4)"),
                ("Amount", AMOUNT),
                ("PartyA", SHORT_CODE),
                ("PartyB", SHORT_CODE),
                ("AccountReference", "required"),
                ("Remarks", "required"),
                ("QueueTimeOutURL", "required | url"),
                ("ResultURL", "required | url"),
            ],
            Self::C2bRegister => &[
                ("ShortCode", SHORT_CODE),
                ("ResponseType", "required | in_list(Completed,Cancelled)"),
                ("ConfirmationURL", "required | url"),
                ("ValidationURL", "required | url"),
            ],
            Self::C2bSimulate => &[
                ("ShortCode", SHORT_CODE),
                ("CommandID", "required | in_list(CustomerPayBillOnline,CustomerBuyGoodsOnline)"),
                ("Amount", AMOUNT),
                ("Msisdn", MSISDN),
            ],
            Self::AccountBalance => &[
                ("Initiator", "required"),
                ("SecurityCredential", "required"),
                ("CommandID", "required"),
                ("PartyA", SHORT_CODE),
                ("IdentifierType", "required | in_list(1,2,4)"),
                ("Remarks", "required"),
                ("QueueTimeOutURL", "required | url"),
                ("ResultURL", "required | url"),
            ],
            Self::TransactionStatus => &[
                ("Initiator", "required"),
                ("SecurityCredential", "required"),
                ("CommandID", "required"),
                ("TransactionID", "required"),
                ("PartyA", SHORT_CODE),
                ("IdentifierType", "required | in_list(1,2,4)"),
                ("Remarks", "required"),
                ("QueueTimeOutURL", "required | url"),
                ("ResultURL", "required | url"),
            ],
            Self::Reversal => &[
                ("Initiator", "required"),
                ("SecurityCredential", "required"),
                ("CommandID", "required"),
                ("TransactionID", "required"),
                ("Amount", AMOUNT),
                ("ReceiverParty", SHORT_CODE),
                ("RecieverIdentifierType", "required | in_list(1,2,4,11)"),
                ("Remarks", "required"),
                ("QueueTimeOutURL", "required | url"),
                ("ResultURL", "required | url"),
            ],
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = MpesaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|endpoint| endpoint.name() == wanted).ok_or_else(|| {
            MpesaError::configuration(format!(
                "unknown transaction type '{s}', expected one of: {}",
                Self::ALL.map(Self::name).join(", ")
            ))
        })
    }
}
