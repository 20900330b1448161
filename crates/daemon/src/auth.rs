//! Client authentication hook.
//!
//! The transport asks an [`Authenticator`] once per offered public key. The
//! only implementation shipped today is [`AcceptAll`], a placeholder that
//! admits every key; a real policy (for example an `authorized_keys`
//! lookup) plugs in through the same trait without touching the dispatcher.

use std::collections::HashMap;

use russh::keys::{HashAlg, PublicKey};
use thiserror::Error;

/// Errors an authenticator may raise. A failing hook aborts only the
/// connection being authenticated.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The policy backend could not be consulted.
    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
}

/// The identity a client presents during the handshake.
#[derive(Debug, Clone, Copy)]
pub struct ClientIdentity<'a> {
    /// User name the client asked to log in as.
    pub user: &'a str,
    /// Public key the client offered.
    pub public_key: &'a PublicKey,
}

impl ClientIdentity<'_> {
    /// Returns the SHA-256 fingerprint of the offered key.
    pub fn fingerprint(&self) -> String {
        self.public_key.fingerprint(HashAlg::Sha256).to_string()
    }
}

/// Attributes attached to an accepted identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    /// Options the server must enforce or refuse the login.
    pub critical_options: HashMap<String, String>,
    /// Optional, informational attributes.
    pub extensions: HashMap<String, String>,
}

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Admit the client with the given permissions.
    Accept(Permissions),
    /// Refuse this key; the client may try another.
    Reject,
}

/// Policy deciding which client identities may connect.
pub trait Authenticator: Send + Sync {
    /// Decides whether `identity` may open a session.
    fn authenticate(&self, identity: &ClientIdentity<'_>) -> Result<AuthDecision, AuthError>;
}

/// Admits every identity with empty permissions.
///
/// Placeholder policy: it performs no credential validation at all and must
/// be replaced before the server is exposed to untrusted networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Authenticator for AcceptAll {
    fn authenticate(&self, _identity: &ClientIdentity<'_>) -> Result<AuthDecision, AuthError> {
        Ok(AuthDecision::Accept(Permissions::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use russh::keys::{Algorithm, PrivateKey};

    fn client_key() -> PublicKey {
        PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
            .unwrap()
            .public_key()
            .clone()
    }

    #[test]
    fn test_accept_all_accepts_with_empty_permissions() {
        let key = client_key();
        let identity = ClientIdentity {
            user: "docker",
            public_key: &key,
        };

        let decision = AcceptAll.authenticate(&identity).unwrap();
        let AuthDecision::Accept(permissions) = decision else {
            panic!("expected accept");
        };
        assert!(permissions.critical_options.is_empty());
        assert!(permissions.extensions.is_empty());
    }

    #[test]
    fn test_identity_fingerprint() {
        let key = client_key();
        let identity = ClientIdentity {
            user: "docker",
            public_key: &key,
        };
        assert!(identity.fingerprint().starts_with("SHA256:"));
    }

    struct DenyUser(&'static str);

    impl Authenticator for DenyUser {
        fn authenticate(&self, identity: &ClientIdentity<'_>) -> Result<AuthDecision, AuthError> {
            if identity.user == self.0 {
                Ok(AuthDecision::Reject)
            } else {
                Ok(AuthDecision::Accept(Permissions::default()))
            }
        }
    }

    #[test]
    fn test_custom_policy_through_trait_object() {
        let key = client_key();
        let policy: Box<dyn Authenticator> = Box::new(DenyUser("root"));

        let root = ClientIdentity {
            user: "root",
            public_key: &key,
        };
        let docker = ClientIdentity {
            user: "docker",
            public_key: &key,
        };
        assert_eq!(policy.authenticate(&root).unwrap(), AuthDecision::Reject);
        assert!(matches!(
            policy.authenticate(&docker).unwrap(),
            AuthDecision::Accept(_)
        ));
    }
}
