//! SCRAM-SHA-256 authentication implementation.
//!
//! Implements RFC 5802 (SCRAM) and RFC 7677 (SCRAM-SHA-256) for PostgreSQL,
//! without channel binding (`n,,` GS2 header).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use super::error::{PgError, PgResult};

type HmacSha256 = Hmac<Sha256>;

pub const MECHANISM: &str = "SCRAM-SHA-256";

/// Channel binding "n,," base64 encoded.
const GS2_HEADER_B64: &str = "biws";

enum State {
    /// client-first sent, waiting for server-first
    Started,
    /// client-final sent, waiting for the server signature
    ProofSent {
        salted_password: [u8; 32],
        auth_message: String,
    },
    Done,
}

/// SCRAM-SHA-256 client state machine.
pub struct ScramClient {
    password: String,
    client_nonce: String,
    client_first_bare: String,
    state: State,
}

impl ScramClient {
    /// Create a new SCRAM client with a fresh random nonce.
    pub fn new(username: &str, password: &str) -> Self {
        let nonce_bytes: [u8; 18] = rand::thread_rng().gen();
        Self::with_nonce(username, password, BASE64.encode(nonce_bytes))
    }

    fn with_nonce(username: &str, password: &str, client_nonce: String) -> Self {
        // ',' and '=' must be escaped inside a saslname
        let user = username.replace('=', "=3D").replace(',', "=2C");
        Self {
            password: password.to_string(),
            client_first_bare: format!("n={},r={}", user, client_nonce),
            client_nonce,
            state: State::Started,
        }
    }

    /// The client-first-message: `n,,n=<user>,r=<client-nonce>`.
    pub fn client_first_message(&self) -> Vec<u8> {
        format!("n,,{}", self.client_first_bare).into_bytes()
    }

    /// Consume server-first (`r=<nonce>,s=<salt>,i=<iterations>`) and
    /// produce the client-final-message carrying the proof.
    pub fn process_server_first(&mut self, server_msg: &[u8]) -> PgResult<Vec<u8>> {
        if !matches!(self.state, State::Started) {
            return Err(scram_error("unexpected server-first-message"));
        }
        let server_first = std::str::from_utf8(server_msg)
            .map_err(|_| scram_error("server-first-message is not UTF-8"))?;

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for part in server_first.split(',') {
            match part.split_once('=') {
                Some(("r", v)) => nonce = Some(v),
                Some(("s", v)) => {
                    salt = Some(BASE64.decode(v).map_err(|_| scram_error("invalid salt"))?)
                }
                Some(("i", v)) => {
                    iterations = Some(
                        v.parse::<u32>()
                            .ok()
                            .filter(|i| *i > 0)
                            .ok_or_else(|| scram_error("invalid iteration count"))?,
                    )
                }
                Some(("m", _)) => return Err(scram_error("mandatory extensions are not supported")),
                _ => {}
            }
        }

        let nonce = nonce.ok_or_else(|| scram_error("missing nonce"))?;
        let salt = salt.ok_or_else(|| scram_error("missing salt"))?;
        let iterations = iterations.ok_or_else(|| scram_error("missing iteration count"))?;

        if nonce.len() <= self.client_nonce.len() || !nonce.starts_with(&self.client_nonce) {
            return Err(scram_error("server nonce does not extend the client nonce"));
        }

        let salted_password = hi(self.password.as_bytes(), &salt, iterations)?;
        let client_key = hmac_sha256(&salted_password, b"Client Key")?;
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();

        let client_final_without_proof = format!("c={},r={}", GS2_HEADER_B64, nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, client_final_without_proof
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes())?;
        let mut proof = client_key;
        proof
            .iter_mut()
            .zip(client_signature)
            .for_each(|(p, s)| *p ^= s);

        self.state = State::ProofSent {
            salted_password,
            auth_message,
        };
        Ok(format!("{},p={}", client_final_without_proof, BASE64.encode(proof)).into_bytes())
    }

    /// Check the server-final-message (`v=<signature>`).
    pub fn verify_server_final(&mut self, server_msg: &[u8]) -> PgResult<()> {
        let State::ProofSent {
            salted_password,
            auth_message,
        } = &self.state
        else {
            return Err(scram_error("unexpected server-final-message"));
        };

        let server_final = std::str::from_utf8(server_msg)
            .map_err(|_| scram_error("server-final-message is not UTF-8"))?;
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(scram_error(&format!("server rejected authentication: {}", err)));
        }
        let signature = server_final
            .strip_prefix("v=")
            .and_then(|v| BASE64.decode(v).ok())
            .ok_or_else(|| scram_error("malformed server signature"))?;

        let server_key = hmac_sha256(salted_password, b"Server Key")?;
        let expected = hmac_sha256(&server_key, auth_message.as_bytes())?;
        if signature != expected {
            return Err(scram_error("server signature mismatch"));
        }

        self.state = State::Done;
        Ok(())
    }
}

fn scram_error(msg: &str) -> PgError {
    PgError::Auth(format!("SCRAM: {}", msg))
}

/// Hi() function - PBKDF2 with HMAC-SHA-256
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> PgResult<[u8; 32]> {
    let mut output = [0u8; 32];
    pbkdf2::pbkdf2::<HmacSha256>(password, salt, iterations, &mut output)
        .map_err(|_| scram_error("key derivation failed"))?;
    Ok(output)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> PgResult<[u8; 32]> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|_| scram_error("invalid HMAC key"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 section 3
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";

    fn rfc_client() -> ScramClient {
        ScramClient::with_nonce("user", "pencil", CLIENT_NONCE.to_string())
    }

    #[test]
    fn test_rfc7677_exchange() {
        let mut client = rfc_client();
        assert_eq!(client.client_first_message(), b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO");

        let client_final = client.process_server_first(SERVER_FIRST.as_bytes()).unwrap();
        assert_eq!(
            String::from_utf8(client_final).unwrap(),
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
             p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );

        client
            .verify_server_final(b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=")
            .unwrap();
    }

    #[test]
    fn test_forged_server_signature_is_rejected() {
        let mut client = rfc_client();
        client.process_server_first(SERVER_FIRST.as_bytes()).unwrap();
        let err = client
            .verify_server_final(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
            .unwrap_err();
        assert!(matches!(err, PgError::Auth(_)));
    }

    #[test]
    fn test_nonce_must_extend_client_nonce() {
        let mut client = rfc_client();
        let err = client
            .process_server_first(b"r=someoneelse,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap_err();
        assert!(err.to_string().contains("nonce"));
    }

    #[test]
    fn test_out_of_order_messages() {
        let mut client = rfc_client();
        assert!(client.verify_server_final(b"v=xyz").is_err());
        assert!(client
            .process_server_first(b"r=rOprNGfwEbeRWgbNEkqOx,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=0")
            .is_err());
    }

    #[test]
    fn test_random_nonce_and_username_escaping() {
        let a = ScramClient::new("a=b,c", "pw");
        let b = ScramClient::new("a=b,c", "pw");
        let first = String::from_utf8(a.client_first_message()).unwrap();
        assert!(first.starts_with("n,,n=a=3Db=2Cc,r="));
        assert_ne!(a.client_first_message(), b.client_first_message());
    }
}
