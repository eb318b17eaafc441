use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Per-authorization PKCE material plus the random `state` parameter that
/// correlates the eventual callback with this attempt.
pub struct AuthorizationAttempt {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
}

impl AuthorizationAttempt {
    pub fn generate() -> Self {
        let code_verifier = random_urlsafe(32);

        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let code_challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

        Self {
            code_verifier,
            code_challenge,
            state: random_urlsafe(16),
        }
    }
}

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::Rng::fill_bytes(&mut rand::rng(), &mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
