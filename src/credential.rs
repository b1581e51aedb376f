//! API key lookup, validation and (re)prompting

use anyhow::Result;

use crate::client::CompletionBackend;
use crate::store::KeyValueStore;

/// Storage key the credential is kept under
pub const CREDENTIAL_KEY: &str = "openai-key";

pub const MISSING_CREDENTIAL_ALERT: &str = "API key is required to proceed.";

/// Asks the person at the keyboard for a credential
pub trait CredentialPrompt {
    /// `None` or an empty answer means the user declined
    fn request(&mut self) -> Result<Option<String>>;

    /// Tell the user something they have to acknowledge
    fn alert(&mut self, message: &str);
}

/// Return a usable credential, or `None` when the user declined to give one.
///
/// A stored credential gets one validation call against `validation_model`.
/// If it is rejected, or nothing is stored, the user is asked and a
/// non-empty answer is persisted. Answers are not validated again.
pub async fn resolve<B, S, P>(
    backend: &B,
    store: &mut S,
    prompt: &mut P,
    validation_model: &str,
) -> Result<Option<String>>
where
    B: CompletionBackend + ?Sized,
    S: KeyValueStore + ?Sized,
    P: CredentialPrompt + ?Sized,
{
    if let Some(stored) = store.get(CREDENTIAL_KEY)?.filter(|k| !k.is_empty()) {
        match backend.validate(&stored, validation_model).await {
            Ok(()) => return Ok(Some(stored)),
            Err(e) => {
                tracing::warn!(error = %e, "invalid API key, requesting a new one");
            }
        }
    }

    let entered = prompt
        .request()?
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    match entered {
        Some(key) => {
            store.set(CREDENTIAL_KEY, &key)?;
            tracing::info!("API key saved");
            Ok(Some(key))
        }
        None => {
            prompt.alert(MISSING_CREDENTIAL_ALERT);
            Ok(None)
        }
    }
}
