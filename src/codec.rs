// src/codec.rs
//! Canonical ABI encodings of a user operation and the hashes derived from them.
//!
//! The signing encoding must match `EntryPoint.getUserOpHash` bit for bit: dynamic
//! byte fields are replaced by their keccak256 digest, `signature` is left out, and
//! every value occupies one 32-byte word.
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256, U512};
use ethers::utils::keccak256;

use crate::error::EncodingError;
use crate::types::{UserOperation, WireUserOperation};

const ZERO_BYTE_GAS: u64 = 4;
const NON_ZERO_BYTE_GAS: u64 = 16;

// Narrow a caller-supplied integer to one ABI word
fn word(field: &'static str, value: U512) -> Result<U256, EncodingError> {
    if value.bits() > 256 {
        return Err(EncodingError::ValueOutOfRange { field });
    }
    let mut buf = [0u8; 64];
    value.to_big_endian(&mut buf);
    Ok(U256::from_big_endian(&buf[32..]))
}

fn uint(field: &'static str, value: U512) -> Result<Token, EncodingError> {
    word(field, value).map(Token::Uint)
}

fn digest(data: &[u8]) -> Token {
    Token::FixedBytes(keccak256(data).to_vec())
}

/// Fixed-width encoding hashed for signing. `signature` is excluded.
pub fn encode_for_signing(op: &UserOperation) -> Result<Vec<u8>, EncodingError> {
    let sender = op.sender_address()?;

    Ok(encode(&[
        Token::Address(sender),
        uint("nonce", op.nonce)?,
        digest(&op.init_code),
        digest(&op.call_data),
        uint("callGasLimit", op.call_gas_limit)?,
        uint("verificationGasLimit", op.verification_gas_limit)?,
        uint("preVerificationGas", op.pre_verification_gas)?,
        uint("maxFeePerGas", op.max_fee_per_gas)?,
        uint("maxPriorityFeePerGas", op.max_priority_fee_per_gas)?,
        digest(&op.paymaster_and_data),
    ]))
}

/// Full encoding with dynamic byte fields embedded, signature included.
/// Used for payload sizing only, never for hashing.
pub fn encode_for_transmission(op: &UserOperation) -> Result<Vec<u8>, EncodingError> {
    let sender = op.sender_address()?;

    Ok(encode(&[
        Token::Address(sender),
        uint("nonce", op.nonce)?,
        Token::Bytes(op.init_code.to_vec()),
        Token::Bytes(op.call_data.to_vec()),
        uint("callGasLimit", op.call_gas_limit)?,
        uint("verificationGasLimit", op.verification_gas_limit)?,
        uint("preVerificationGas", op.pre_verification_gas)?,
        uint("maxFeePerGas", op.max_fee_per_gas)?,
        uint("maxPriorityFeePerGas", op.max_priority_fee_per_gas)?,
        Token::Bytes(op.paymaster_and_data.to_vec()),
        Token::Bytes(op.signature.to_vec()),
    ]))
}

pub fn operation_hash(op: &UserOperation) -> Result<H256, EncodingError> {
    let encoded = encode_for_signing(op)?;
    Ok(H256::from(keccak256(encoded)))
}

/// Binds an operation hash to one entry point on one chain.
pub fn domain_hash(op_hash: H256, entry_point: Address, chain_id: U256) -> H256 {
    let encoded = encode(&[
        Token::FixedBytes(op_hash.as_bytes().to_vec()),
        Token::Address(entry_point),
        Token::Uint(chain_id),
    ]);
    H256::from(keccak256(encoded))
}

/// The user operation hash reported by the entry point, and the proof signal.
pub fn user_op_hash(
    op: &UserOperation,
    entry_point: Address,
    chain_id: U256,
) -> Result<H256, EncodingError> {
    Ok(domain_hash(operation_hash(op)?, entry_point, chain_id))
}

// Minimal 0x-prefixed lowercase hex
fn quantity(field: &'static str, value: U512) -> Result<String, EncodingError> {
    let value = word(field, value)?;
    if value.is_zero() {
        return Ok("0x0".to_string());
    }
    Ok(format!("{:#x}", value))
}

pub fn transform_for_wire(op: &UserOperation) -> Result<WireUserOperation, EncodingError> {
    Ok(WireUserOperation {
        sender: op.sender_address()?,
        nonce: quantity("nonce", op.nonce)?,
        init_code: op.init_code.clone(),
        call_data: op.call_data.clone(),
        call_gas_limit: quantity("callGasLimit", op.call_gas_limit)?,
        verification_gas_limit: quantity("verificationGasLimit", op.verification_gas_limit)?,
        pre_verification_gas: quantity("preVerificationGas", op.pre_verification_gas)?,
        max_fee_per_gas: quantity("maxFeePerGas", op.max_fee_per_gas)?,
        max_priority_fee_per_gas: quantity("maxPriorityFeePerGas", op.max_priority_fee_per_gas)?,
        paymaster_and_data: op.paymaster_and_data.clone(),
        signature: op.signature.clone(),
    })
}

/// Calldata gas of the transmission encoding: 4 per zero byte, 16 per non-zero byte.
pub fn calldata_gas(op: &UserOperation) -> Result<u64, EncodingError> {
    let encoded = encode_for_transmission(op)?;
    Ok(encoded
        .iter()
        .map(|b| if *b == 0 { ZERO_BYTE_GAS } else { NON_ZERO_BYTE_GAS })
        .sum())
}

/// Factory address followed by the factory call, deploying the sender on first use.
pub fn init_code(factory: Address, factory_call: &[u8]) -> Bytes {
    let mut data = Vec::with_capacity(Address::len_bytes() + factory_call.len());
    data.extend_from_slice(factory.as_bytes());
    data.extend_from_slice(factory_call);
    Bytes::from(data)
}

/// Two-dimensional nonce: a 192-bit key above a 64-bit sequence.
pub fn keyed_nonce(key: U256, sequence: u64) -> Result<U512, EncodingError> {
    if key.bits() > 192 {
        return Err(EncodingError::ValueOutOfRange { field: "nonce key" });
    }
    Ok((U512::from(key) << 64) | U512::from(sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

    fn sender(len: usize) -> Bytes {
        let mut raw = vec![0u8; len];
        if let Some(last) = raw.last_mut() {
            *last = 1;
        }
        Bytes::from(raw)
    }

    fn zero_op() -> UserOperation {
        UserOperation {
            sender: sender(20),
            ..Default::default()
        }
    }

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: sender(20),
            nonce: keyed_nonce(U256::from(2), 0).unwrap(),
            init_code: init_code(Address::repeat_byte(0xfa), &[0x5f, 0xbf, 0xb9, 0xcf]),
            call_data: Bytes::from(vec![0xb6, 0x1d, 0x27, 0xf6]),
            call_gas_limit: U512::from(2_000_000u64),
            verification_gas_limit: U512::from(1_000_000u64),
            pre_verification_gas: U512::from(50_000u64),
            max_fee_per_gas: U512::from(3_000_000_000u64),
            max_priority_fee_per_gas: U512::from(1_000_000_000u64),
            paymaster_and_data: Bytes::default(),
            signature: Bytes::default(),
        }
    }

    fn h256(hex_str: &str) -> H256 {
        H256::from_slice(&hex::decode(hex_str).unwrap())
    }

    #[test]
    fn zero_operation_hash_is_pinned() {
        let expected = h256("c17e00cf62b8bb8ddde6432f06a5180222980bfb4be8c88ba699e0581e272e1f");
        assert_eq!(operation_hash(&zero_op()).unwrap(), expected);
    }

    #[test]
    fn zero_operation_domain_hash_is_pinned() {
        let entry_point: Address = ENTRY_POINT.parse().unwrap();
        let op_hash = operation_hash(&zero_op()).unwrap();

        assert_eq!(
            domain_hash(op_hash, entry_point, U256::from(31337)),
            h256("ae9c9b7415b62f92d4558a2ab16d5b94e02d280d42190e715ea8482b76743fa0")
        );
        assert_eq!(
            domain_hash(op_hash, entry_point, U256::one()),
            h256("0342b31d1183615a9c97b6467f315aabc1ccdf8575cd79c2bf1478ac4ffe6d11")
        );
    }

    #[test]
    fn signing_encoding_is_ten_words() {
        let encoded = encode_for_signing(&sample_op()).unwrap();
        assert_eq!(encoded.len(), 10 * 32);
        assert_eq!(&encoded[64..96], &keccak256(&sample_op().init_code)[..]);
    }

    #[test]
    fn hash_is_deterministic_and_ignores_signature() {
        let op = sample_op();
        let first = operation_hash(&op).unwrap();
        let second = operation_hash(&op).unwrap();
        let signed = op.with_signature(Bytes::from(vec![0xab; 416]));

        assert_eq!(first, second);
        assert_eq!(first, operation_hash(&signed).unwrap());
    }

    #[test]
    fn hash_covers_dynamic_fields() {
        let op = sample_op();
        let changed = UserOperation {
            call_data: Bytes::from(vec![0x00]),
            ..op.clone()
        };
        assert_ne!(operation_hash(&op).unwrap(), operation_hash(&changed).unwrap());
    }

    #[test]
    fn domain_hash_separates_entry_point_and_chain() {
        let op_hash = operation_hash(&sample_op()).unwrap();
        let entry_point: Address = ENTRY_POINT.parse().unwrap();
        let other = Address::repeat_byte(0x11);

        let base = domain_hash(op_hash, entry_point, U256::from(31337));
        assert_ne!(base, domain_hash(op_hash, other, U256::from(31337)));
        assert_ne!(base, domain_hash(op_hash, entry_point, U256::from(1)));
    }

    #[test]
    fn sender_must_be_twenty_bytes() {
        for len in [19, 21] {
            let op = UserOperation {
                sender: sender(len),
                ..Default::default()
            };
            assert_eq!(
                encode_for_signing(&op),
                Err(EncodingError::InvalidAddressLength { len })
            );
            assert!(transform_for_wire(&op).is_err());
        }
    }

    #[test]
    fn nonce_must_fit_256_bits() {
        let limit = U512::one() << 256;

        let too_big = UserOperation {
            nonce: limit,
            ..zero_op()
        };
        assert_eq!(
            operation_hash(&too_big),
            Err(EncodingError::ValueOutOfRange { field: "nonce" })
        );

        let max = UserOperation {
            nonce: limit - U512::one(),
            ..zero_op()
        };
        assert!(operation_hash(&max).is_ok());
        let encoded = encode_for_signing(&max).unwrap();
        assert!(encoded[32..64].iter().all(|b| *b == 0xff));
    }

    #[test]
    fn wire_quantities_are_minimal_hex() {
        let wire = transform_for_wire(&sample_op()).unwrap();
        assert_eq!(wire.call_gas_limit, "0x1e8480");
        assert_eq!(wire.nonce, "0x20000000000000000");

        let wire = transform_for_wire(&zero_op()).unwrap();
        assert_eq!(wire.nonce, "0x0");
        assert_eq!(wire.max_fee_per_gas, "0x0");
        assert_eq!(wire.init_code, Bytes::default());
    }

    #[test]
    fn wire_record_serializes_camel_case() {
        let wire = transform_for_wire(&sample_op()).unwrap();
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["callGasLimit"], "0x1e8480");
        assert_eq!(json["sender"], "0x0000000000000000000000000000000000000001");
        assert_eq!(json["callData"], "0xb61d27f6");
    }

    #[test]
    fn transmission_encoding_embeds_signature() {
        let unsigned = encode_for_transmission(&sample_op()).unwrap();
        let signed =
            encode_for_transmission(&sample_op().with_signature(Bytes::from(vec![1u8; 32])))
                .unwrap();
        assert_eq!(signed.len(), unsigned.len() + 32);
    }

    #[test]
    fn calldata_gas_counts_zero_and_non_zero_bytes() {
        let op = sample_op();
        let encoded = encode_for_transmission(&op).unwrap();
        let zeros = encoded.iter().filter(|b| **b == 0).count() as u64;
        let non_zeros = encoded.len() as u64 - zeros;

        assert_eq!(calldata_gas(&op).unwrap(), zeros * 4 + non_zeros * 16);
    }

    #[test]
    fn keyed_nonce_rejects_wide_keys() {
        assert_eq!(keyed_nonce(U256::from(2), 5).unwrap(), (U512::from(2u64) << 64) + 5);
        assert!(keyed_nonce(U256::MAX, 0).is_err());
    }

    #[test]
    fn init_code_prefixes_factory() {
        let factory = Address::repeat_byte(0xfa);
        let code = init_code(factory, &[1, 2, 3]);
        assert_eq!(&code[..20], factory.as_bytes());
        assert_eq!(&code[20..], &[1, 2, 3]);
    }
}
