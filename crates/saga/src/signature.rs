//! HMAC-SHA256 signatures for webhooks and client payment proofs.

use hmac::digest::Key;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keys the MAC with a block-sized key: longer secrets are hashed first and
/// shorter ones zero-padded, which is what HMAC does with any key.
fn keyed(secret: &[u8]) -> HmacSha256 {
    let mut block = Key::<HmacSha256>::default();
    if secret.len() > block.len() {
        let digest = <Sha256 as sha2::Digest>::digest(secret);
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..secret.len()].copy_from_slice(secret);
    }
    <HmacSha256 as Mac>::new(&block)
}

/// Hex-encoded HMAC-SHA256 of `data` under `secret`.
pub fn sign(secret: &str, data: &[u8]) -> String {
    let mut mac = keyed(secret.as_bytes());
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a hex signature in constant time. An unset secret verifies nothing.
pub fn verify(secret: &str, data: &[u8], signature_hex: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = keyed(secret.as_bytes());
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

/// The message a client proof signs: `"{gateway_order_ref}|{gateway_payment_ref}"`.
pub fn payment_proof_message(gateway_order_ref: &str, gateway_payment_ref: &str) -> String {
    format!("{gateway_order_ref}|{gateway_payment_ref}")
}

/// Signs a client payment proof the way the gateway does.
pub fn sign_payment_proof(key_secret: &str, gateway_order_ref: &str, gateway_payment_ref: &str) -> String {
    sign(
        key_secret,
        payment_proof_message(gateway_order_ref, gateway_payment_ref).as_bytes(),
    )
}

/// Verifies a client payment proof.
pub fn verify_payment_proof(
    key_secret: &str,
    gateway_order_ref: &str,
    gateway_payment_ref: &str,
    signature_hex: &str,
) -> bool {
    verify(
        key_secret,
        payment_proof_message(gateway_order_ref, gateway_payment_ref).as_bytes(),
        signature_hex,
    )
}
