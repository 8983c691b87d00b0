use thiserror::Error;

#[derive(Debug, Error)]
#[error("secret could not be {operation}: {message}")]
pub struct SecretError {
    pub operation: &'static str,
    pub message: String,
}

/// Encrypt-before-write / decrypt-after-read boundary for endpoint secrets
/// (`url`, `url_variables`, `token`).
///
/// The endpoint store calls it explicitly on every load and save path.
pub trait SecretBox: Send + Sync {
    fn seal(&self, plaintext: &str) -> Result<String, SecretError>;
    fn open(&self, sealed: &str) -> Result<String, SecretError>;
}

/// For deployments where the database already encrypts at rest.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSecrets;

impl SecretBox for PassthroughSecrets {
    fn seal(&self, plaintext: &str) -> Result<String, SecretError> {
        Ok(plaintext.to_string())
    }

    fn open(&self, sealed: &str) -> Result<String, SecretError> {
        Ok(sealed.to_string())
    }
}
