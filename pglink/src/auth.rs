//! Authentication responders.
//!
//! Supported methods are trust, cleartext password, MD5 password, and SASL with
//! `SCRAM-SHA-256` without channel binding.
//!
//! <https://www.postgresql.org/docs/current/auth-password.html>
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::BytesMut;
use hmac::{Hmac, Mac};
use rand::{Rng, distributions::Alphanumeric};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{
    common::span,
    postgres::{backend::AuthenticationRequest, frontend},
};

type HmacSha256 = Hmac<Sha256>;

const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// Whether the backend still expects authentication messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Authenticated,
}

/// Answer `AuthenticationRequest` messages of one login.
pub struct Authenticator<'a> {
    user: &'a str,
    password: Option<&'a str>,
    scram: Option<ScramClient>,
}

impl<'a> Authenticator<'a> {
    pub fn new(user: &'a str, password: Option<&'a str>) -> Self {
        Self { user, password, scram: None }
    }

    /// Write the response to `req`, if any, to `buf`.
    pub fn respond(&mut self, req: AuthenticationRequest, buf: &mut BytesMut) -> Result<Progress, AuthError> {
        use AuthenticationRequest as A;

        span!("authenticate", method = req.method());

        match req {
            A::Ok => return Ok(Progress::Authenticated),
            A::CleartextPassword => {
                let password = self.password(&req)?;
                frontend::write(frontend::PasswordMessage { password }, buf);
            }
            A::MD5Password { salt } => {
                let password = md5_password(self.user, self.password(&req)?, salt);
                frontend::write(frontend::PasswordMessage { password: &password }, buf);
            }
            A::SASL { ref mechanisms } => {
                if !mechanisms.iter().any(|e| e == SCRAM_SHA_256) {
                    return Err(AuthError::Mechanisms(mechanisms.clone()));
                }
                // the backend ignores this user name in favor of the startup one
                let scram = ScramClient::new("", self.password(&req)?);
                frontend::write(
                    frontend::SASLInitialResponse {
                        mechanism: SCRAM_SHA_256,
                        data: scram.client_first().as_bytes(),
                    },
                    buf,
                );
                self.scram = Some(scram);
            }
            A::SASLContinue { data } => {
                let Some(scram) = self.scram.as_mut() else {
                    return Err(AuthError::Scram("SASLContinue without SASL"));
                };
                let client_final = scram.server_first(&data)?;
                frontend::write(frontend::SASLResponse { data: client_final.as_bytes() }, buf);
            }
            A::SASLFinal { data } => {
                let Some(scram) = self.scram.take() else {
                    return Err(AuthError::Scram("SASLFinal without SASL"));
                };
                scram.server_final(&data)?;
            }
            A::KerberosV5 | A::GSS | A::GSSContinue { .. } | A::SSPI => {
                return Err(AuthError::UnrecognisedType(req.method()));
            }
        }

        Ok(Progress::Pending)
    }

    fn password(&self, req: &AuthenticationRequest) -> Result<&'a str, AuthError> {
        self.password.ok_or(AuthError::PasswordRequired(req.method()))
    }
}

/// `"md5" + hex(md5(hex(md5(password + user)) + salt))`
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = md5::compute(format!("{password}{user}"));

    let mut outer = format!("{inner:x}").into_bytes();
    outer.extend_from_slice(&salt);

    format!("md5{:x}", md5::compute(outer))
}

/// Client side of a `SCRAM-SHA-256` exchange.
///
/// <https://datatracker.ietf.org/doc/html/rfc7677>
pub struct ScramClient {
    client_first_bare: String,
    password: String,
    client_nonce: String,
    // set by `server_first`
    salted_password: [u8; 32],
    auth_message: String,
}

impl ScramClient {
    pub fn new(user: &str, password: &str) -> Self {
        let nonce = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        Self::with_nonce(user, password, nonce)
    }

    fn with_nonce(user: &str, password: &str, client_nonce: String) -> Self {
        Self {
            client_first_bare: format!("n={user},r={client_nonce}"),
            password: password.to_owned(),
            client_nonce,
            salted_password: [0; 32],
            auth_message: String::new(),
        }
    }

    /// `client-first-message`, no channel binding and no authzid.
    pub fn client_first(&self) -> String {
        format!("n,,{}", self.client_first_bare)
    }

    /// Process `server-first-message`, returns `client-final-message`.
    pub fn server_first(&mut self, data: &[u8]) -> Result<String, AuthError> {
        let msg = std::str::from_utf8(data).map_err(|_| AuthError::Scram("server-first is not utf8"))?;

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for part in msg.split(',') {
            if let Some(value) = part.strip_prefix("r=") {
                nonce = Some(value);
            } else if let Some(value) = part.strip_prefix("s=") {
                salt = Some(BASE64.decode(value).map_err(|_| AuthError::Scram("invalid salt"))?);
            } else if let Some(value) = part.strip_prefix("i=") {
                iterations = Some(value.parse::<u32>().map_err(|_| AuthError::Scram("invalid iteration count"))?);
            }
        }

        let nonce = nonce.ok_or(AuthError::Scram("missing nonce"))?;
        let salt = salt.ok_or(AuthError::Scram("missing salt"))?;
        let iterations = iterations.ok_or(AuthError::Scram("missing iteration count"))?;

        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(AuthError::Scram("invalid server nonce"));
        }

        pbkdf2::pbkdf2_hmac::<Sha256>(self.password.as_bytes(), &salt, iterations, &mut self.salted_password);

        // "biws" is base64 of the gs2 header "n,,"
        let client_final_without_proof = format!("c=biws,r={nonce}");
        self.auth_message = format!("{},{msg},{client_final_without_proof}", self.client_first_bare);

        let client_key = hmac_sha256(&self.salted_password, b"Client Key")?;
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();
        let client_signature = hmac_sha256(&stored_key, self.auth_message.as_bytes())?;

        let mut proof = client_key;
        for (p, s) in proof.iter_mut().zip(client_signature) {
            *p ^= s;
        }

        Ok(format!("{client_final_without_proof},p={}", BASE64.encode(proof)))
    }

    /// Verify `server-final-message`.
    pub fn server_final(&self, data: &[u8]) -> Result<(), AuthError> {
        let msg = std::str::from_utf8(data).map_err(|_| AuthError::Scram("server-final is not utf8"))?;

        if msg.starts_with("e=") {
            return Err(AuthError::Scram("server rejected the exchange"));
        }

        let Some(signature) = msg.strip_prefix("v=") else {
            return Err(AuthError::Scram("invalid server-final message"));
        };
        let signature = BASE64.decode(signature).map_err(|_| AuthError::Scram("invalid server signature"))?;

        let server_key = hmac_sha256(&self.salted_password, b"Server Key")?;
        let expected = hmac_sha256(&server_key, self.auth_message.as_bytes())?;

        if signature[..] != expected[..] {
            return Err(AuthError::Scram("server signature mismatch"));
        }

        Ok(())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], AuthError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| AuthError::Scram("invalid hmac key"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// An error during the authentication exchange.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Backend requested a method this client does not implement.
    UnrecognisedType(&'static str),
    /// Backend offered SASL without `SCRAM-SHA-256`.
    Mechanisms(Vec<String>),
    /// Backend requested a password, but none is configured.
    PasswordRequired(&'static str),
    /// The `SCRAM-SHA-256` exchange failed.
    Scram(&'static str),
}

impl std::error::Error for AuthError { }

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::UnrecognisedType(method) => {
                write!(f, "AuthenticationRequest unrecognised type: {method} is not supported")
            }
            AuthError::Mechanisms(mechanisms) => write!(
                f,
                "AuthenticationRequest unrecognised type: no supported SASL mechanism in {mechanisms:?}"
            ),
            AuthError::PasswordRequired(method) => {
                write!(f, "backend requested {method} authentication, but no password is configured")
            }
            AuthError::Scram(reason) => write!(f, "SCRAM-SHA-256 authentication failed: {reason}"),
        }
    }
}

impl fmt::Debug for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn md5() {
        assert_eq!(md5_password("alice", "secret", [1, 2, 3, 4]), "md598a0412b9c31436fc53776e863350083");
    }

    #[test]
    fn scram_rfc7677() {
        let mut scram = ScramClient::with_nonce("user", "pencil", "rOprNGfwEbeRWgbNEkqO".into());
        assert_eq!(scram.client_first(), "n,,n=user,r=rOprNGfwEbeRWgbNEkqO");

        let client_final = scram
            .server_first(b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap();
        assert_eq!(
            client_final,
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );

        scram.server_final(b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=").unwrap();
        assert_eq!(
            scram.server_final(b"v=AAAATRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4="),
            Err(AuthError::Scram("server signature mismatch"))
        );
    }

    #[test]
    fn scram_rejects_foreign_nonce() {
        let mut scram = ScramClient::with_nonce("", "pencil", "abc".into());
        let err = scram.server_first(b"r=xyz123,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096").unwrap_err();
        assert_eq!(err, AuthError::Scram("invalid server nonce"));
    }

    #[test]
    fn respond_cleartext() {
        let mut auth = Authenticator::new("alice", Some("secret"));
        let mut buf = BytesMut::new();
        let progress = auth.respond(AuthenticationRequest::CleartextPassword, &mut buf).unwrap();
        assert_eq!(progress, Progress::Pending);
        assert_eq!(&buf[..], b"p\0\0\0\x0bsecret\0");
    }

    #[test]
    fn respond_ok() {
        let mut auth = Authenticator::new("alice", None);
        let mut buf = BytesMut::new();
        assert_eq!(auth.respond(AuthenticationRequest::Ok, &mut buf).unwrap(), Progress::Authenticated);
        assert!(buf.is_empty());
    }

    #[test]
    fn password_required() {
        let mut auth = Authenticator::new("alice", None);
        let err = auth
            .respond(AuthenticationRequest::MD5Password { salt: [0; 4] }, &mut BytesMut::new())
            .unwrap_err();
        assert_eq!(err, AuthError::PasswordRequired("MD5 password"));
    }

    #[test]
    fn unsupported_methods() {
        let mut auth = Authenticator::new("alice", Some("secret"));
        let err = auth.respond(AuthenticationRequest::GSS, &mut BytesMut::new()).unwrap_err();
        assert!(err.to_string().starts_with("AuthenticationRequest unrecognised type"));

        let sasl = AuthenticationRequest::SASL { mechanisms: vec!["SCRAM-SHA-256-PLUS".into()] };
        let err = auth.respond(sasl, &mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, AuthError::Mechanisms(_)));

        let cont = AuthenticationRequest::SASLContinue { data: Bytes::new() };
        let err = auth.respond(cont, &mut BytesMut::new()).unwrap_err();
        assert_eq!(err, AuthError::Scram("SASLContinue without SASL"));
    }

    #[test]
    fn sasl_initial_response() {
        let mut auth = Authenticator::new("alice", Some("secret"));
        let mut buf = BytesMut::new();
        let sasl = AuthenticationRequest::SASL { mechanisms: vec!["SCRAM-SHA-256".into()] };
        auth.respond(sasl, &mut buf).unwrap();
        assert_eq!(buf[0], b'p');
        let body = &buf[5..];
        assert!(body.starts_with(b"SCRAM-SHA-256\0"));
        assert!(body[14 + 4..].starts_with(b"n,,n=,r="));
    }
}
