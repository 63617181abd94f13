//! Address ↔ `UInt256` mirror of the server-side conversion.
//!
//! The stored integer is the big-endian reading of the byte-reversed 32-byte
//! address. Byte-reversing the integer's big-endian bytes recovers the
//! padded address.

use alloy_primitives::U256;
use chainingest_core::types::ADDRESS_HEX_WIDTH;

/// Convert a 64-hex-char address column into its stored integer.
pub fn address_to_u256(address: &str) -> Result<U256, String> {
    if address.len() != ADDRESS_HEX_WIDTH {
        return Err(format!(
            "address must be {ADDRESS_HEX_WIDTH} hex characters, got {}",
            address.len()
        ));
    }
    let mut bytes: [u8; 32] = hex::decode(address)
        .map_err(|e| format!("invalid hex address: {e}"))?
        .try_into()
        .map_err(|_| "address does not decode to 32 bytes".to_string())?;
    bytes.reverse();
    Ok(U256::from_be_bytes(bytes))
}

/// Inverse of [`address_to_u256`]: 64 uppercase hex characters.
pub fn u256_to_address(value: U256) -> String {
    let mut bytes = value.to_be_bytes::<32>();
    bytes.reverse();
    hex::encode_upper(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(s: &str) -> String {
        format!("{s:0>64}")
    }

    #[test]
    fn roundtrip_recovers_padded_address() {
        let all_f = "F".repeat(64);
        for addr in ["1", "A11CE", "DEADBEEF", all_f.as_str()] {
            let col = padded(addr);
            let n = address_to_u256(&col).unwrap();
            assert_eq!(u256_to_address(n), col);
        }
    }

    #[test]
    fn low_byte_lands_in_high_position() {
        let n = address_to_u256(&padded("1")).unwrap();
        assert_eq!(n, U256::from(1u8) << 248usize);
    }

    #[test]
    fn zero_address() {
        assert_eq!(address_to_u256(&"0".repeat(64)).unwrap(), U256::ZERO);
    }

    #[test]
    fn rejects_wrong_width_and_bad_hex() {
        assert!(address_to_u256("01").is_err());
        assert!(address_to_u256(&"G".repeat(64)).is_err());
    }
}
