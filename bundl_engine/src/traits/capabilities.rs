use thiserror::Error;

/// Phone-number verification, delegated to an external OTP service.
///
/// The engine only cares about the contract: begin a verification for a phone number and get an opaque transaction
/// id back, then exchange (transaction id, code) for the verified phone number.
#[allow(async_fn_in_trait)]
pub trait OtpProvider: Send + Sync {
    /// Sends a one-time code to the phone and returns the transaction id to quote on completion.
    async fn begin_verification(&self, phone_number: &str) -> Result<String, OtpError>;

    /// Verifies the code for the given transaction. Returns the phone number the transaction was opened for.
    async fn complete_verification(&self, tid: &str, code: &str) -> Result<String, OtpError>;
}

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("Unknown or expired verification transaction")]
    UnknownTransaction,
    #[error("The one-time code did not match")]
    CodeMismatch,
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),
    #[error("OTP provider error: {0}")]
    ProviderError(String),
}

/// Push message delivery. Fire-and-forget: implementations log failures and never surface them.
pub trait PushSender: Send + Sync {
    fn send(&self, push_token: &str, title: &str, body: &str) -> impl std::future::Future<Output = ()> + Send;
}
