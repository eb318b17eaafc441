pub mod acquirer;
pub mod callback;
pub mod manager;
pub mod pkce;
pub mod record;
pub mod store;

pub use acquirer::TokenAcquirer;
pub use callback::{listen_for_callback, CallbackParams};
pub use manager::{AuthStatus, TokenManager};
pub use record::{AuthorizationResult, CredentialRecord};
pub use store::TokenStore;
