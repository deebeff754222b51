use secrecy::{ExposeSecret, SecretString};

/// Render a secret for diagnostics without revealing it.
pub fn redact(secret: &SecretString) -> String {
    if secret.expose_secret().is_empty() {
        "(empty)".to_string()
    } else {
        "[REDACTED]".to_string()
    }
}

/// Copy a secret without exposing it anywhere but the new box.
pub fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}
