//! EIP-712 v4 typed-data encoding.
//!
//! Implements the full `eth_signTypedData_v4` payload model: a `types`
//! table, a `primaryType`, a `domain`, and a `message`. Structs may nest,
//! arrays may be fixed or dynamic, and `encodeType` lists referenced struct
//! types alphabetically after the primary type. The signing digest is
//! `keccak256(0x19 0x01 || domainSeparator || hashStruct(message))`.

use std::collections::BTreeMap;

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{CryptoError, Result};

/// One field of a struct type: `{ "name": ..., "type": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Eip712Field {
    /// Field name as it appears in the message object.
    pub name: String,
    /// Solidity type name, e.g. `uint256`, `address`, `Person[]`.
    #[serde(rename = "type")]
    pub ty: String,
}

/// A parsed `eth_signTypedData_v4` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TypedData {
    /// Struct definitions, including `EIP712Domain` when the caller
    /// supplies one.
    pub types: BTreeMap<String, Vec<Eip712Field>>,
    /// The struct type of `message`.
    #[serde(rename = "primaryType")]
    pub primary_type: String,
    /// Domain object; only the fields present participate in the
    /// separator.
    pub domain: Value,
    /// The message object to hash.
    #[serde(default)]
    pub message: Value,
}

/// Canonical EIP712Domain field order used when the payload does not
/// define the domain type explicitly.
const DOMAIN_FIELDS: [(&str, &str); 5] = [
    ("name", "string"),
    ("version", "string"),
    ("chainId", "uint256"),
    ("verifyingContract", "address"),
    ("salt", "bytes32"),
];

impl TypedData {
    /// Parse a payload from its JSON encoding.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CryptoError::TypedData(e.to_string()))
    }

    /// The digest to sign: `keccak256(0x1901 || domainSeparator ||
    /// hashStruct(message))`.
    ///
    /// When `primaryType` is `EIP712Domain` itself, only the domain
    /// separator is covered, matching `eth_signTypedData_v4` behavior for
    /// domain-only payloads.
    pub fn signing_hash(&self) -> Result<B256> {
        let domain_separator = self.domain_separator()?;

        let mut buf = Vec::with_capacity(2 + 32 + 32);
        buf.extend_from_slice(&[0x19, 0x01]);
        buf.extend_from_slice(domain_separator.as_slice());
        if self.primary_type != "EIP712Domain" {
            buf.extend_from_slice(self.hash_struct(&self.primary_type, &self.message)?.as_slice());
        }
        Ok(keccak256(&buf))
    }

    /// `hashStruct(domain)` over the declared or synthesized
    /// `EIP712Domain` type.
    pub fn domain_separator(&self) -> Result<B256> {
        if self.types.contains_key("EIP712Domain") {
            return self.hash_struct("EIP712Domain", &self.domain);
        }

        // Synthesize the domain type from the fields actually present, in
        // canonical order.
        let object = self
            .domain
            .as_object()
            .ok_or_else(|| CryptoError::TypedData("domain must be an object".into()))?;
        let fields: Vec<Eip712Field> = DOMAIN_FIELDS
            .iter()
            .filter(|(name, _)| object.contains_key(*name))
            .map(|(name, ty)| Eip712Field {
                name: (*name).into(),
                ty: (*ty).into(),
            })
            .collect();

        let mut with_domain = self.clone();
        with_domain.types.insert("EIP712Domain".into(), fields);
        with_domain.hash_struct("EIP712Domain", &self.domain)
    }

    /// `keccak256(typeHash || enc(field_1) || ... || enc(field_n))`.
    fn hash_struct(&self, type_name: &str, value: &Value) -> Result<B256> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.type_hash(type_name)?.as_slice());

        let object = value.as_object().ok_or_else(|| {
            CryptoError::TypedData(format!("value for {type_name} must be an object"))
        })?;
        for field in self.fields_of(type_name)? {
            let field_value = object.get(&field.name).ok_or_else(|| {
                CryptoError::TypedData(format!("missing field {}.{}", type_name, field.name))
            })?;
            buf.extend_from_slice(self.encode_value(&field.ty, field_value)?.as_slice());
        }
        Ok(keccak256(&buf))
    }

    fn type_hash(&self, type_name: &str) -> Result<B256> {
        Ok(keccak256(self.encode_type(type_name)?.as_bytes()))
    }

    /// `encodeType`: the primary type followed by every transitively
    /// referenced struct type, alphabetically.
    fn encode_type(&self, type_name: &str) -> Result<String> {
        let mut referenced = Vec::new();
        self.collect_references(type_name, &mut referenced)?;
        referenced.sort();
        referenced.dedup();
        referenced.retain(|name| name != type_name);

        let mut encoded = String::new();
        for name in std::iter::once(type_name).chain(referenced.iter().map(String::as_str)) {
            encoded.push_str(name);
            encoded.push('(');
            let fields = self.fields_of(name)?;
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    encoded.push(',');
                }
                encoded.push_str(&field.ty);
                encoded.push(' ');
                encoded.push_str(&field.name);
            }
            encoded.push(')');
        }
        Ok(encoded)
    }

    fn collect_references(&self, type_name: &str, out: &mut Vec<String>) -> Result<()> {
        for field in self.fields_of(type_name)? {
            let base = base_type(&field.ty);
            if self.types.contains_key(base) && !out.iter().any(|seen| seen == base) {
                out.push(base.to_string());
                self.collect_references(base, out)?;
            }
        }
        Ok(())
    }

    fn fields_of(&self, type_name: &str) -> Result<&[Eip712Field]> {
        self.types
            .get(type_name)
            .map(Vec::as_slice)
            .ok_or_else(|| CryptoError::TypedData(format!("unknown type {type_name}")))
    }

    /// Encode one value to its 32-byte word.
    fn encode_value(&self, ty: &str, value: &Value) -> Result<B256> {
        // Arrays hash the concatenation of their element encodings.
        if let Some(element_ty) = array_element_type(ty) {
            let items = value
                .as_array()
                .ok_or_else(|| CryptoError::TypedData(format!("{ty} value must be an array")))?;
            let mut buf = Vec::with_capacity(items.len() * 32);
            for item in items {
                buf.extend_from_slice(self.encode_value(element_ty, item)?.as_slice());
            }
            return Ok(keccak256(&buf));
        }

        // Nested structs hash recursively.
        if self.types.contains_key(ty) {
            return self.hash_struct(ty, value);
        }

        match ty {
            "string" => {
                let s = value
                    .as_str()
                    .ok_or_else(|| CryptoError::TypedData("string value expected".into()))?;
                Ok(keccak256(s.as_bytes()))
            }
            "bytes" => Ok(keccak256(decode_hex(value)?)),
            "bool" => {
                let b = value
                    .as_bool()
                    .ok_or_else(|| CryptoError::TypedData("bool value expected".into()))?;
                Ok(B256::with_last_byte(b as u8))
            }
            "address" => {
                let s = value
                    .as_str()
                    .ok_or_else(|| CryptoError::TypedData("address value expected".into()))?;
                let address: Address = s
                    .parse()
                    .map_err(|_| CryptoError::TypedData(format!("bad address {s}")))?;
                Ok(address.into_word())
            }
            _ if ty.starts_with("bytes") => {
                let width: usize = ty[5..]
                    .parse()
                    .map_err(|_| CryptoError::TypedData(format!("bad type {ty}")))?;
                let raw = decode_hex(value)?;
                if width == 0 || width > 32 || raw.len() != width {
                    return Err(CryptoError::TypedData(format!(
                        "{ty} value has {} bytes",
                        raw.len()
                    )));
                }
                let mut word = B256::ZERO;
                word[..width].copy_from_slice(&raw);
                Ok(word)
            }
            _ if ty.starts_with("uint") => Ok(B256::from(parse_uint(value)?)),
            _ if ty.starts_with("int") => Ok(B256::from(parse_int(value)?)),
            _ => Err(CryptoError::TypedData(format!("unsupported type {ty}"))),
        }
    }
}

/// Strip any array suffixes: `Person[3][]` → `Person`.
fn base_type(ty: &str) -> &str {
    match ty.find('[') {
        Some(i) => &ty[..i],
        None => ty,
    }
}

/// For `T[]` or `T[n]`, the element type `T...` with one array level
/// removed; `None` for non-arrays.
fn array_element_type(ty: &str) -> Option<&str> {
    if !ty.ends_with(']') {
        return None;
    }
    ty.rfind('[').map(|i| &ty[..i])
}

fn decode_hex(value: &Value) -> Result<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| CryptoError::TypedData("hex string expected".into()))?;
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| CryptoError::TypedData(format!("bad hex: {e}")))
}

fn parse_uint(value: &Value) -> Result<U256> {
    match value {
        Value::Number(n) => {
            let v = n
                .as_u64()
                .ok_or_else(|| CryptoError::TypedData(format!("bad uint {n}")))?;
            Ok(U256::from(v))
        }
        Value::String(s) => {
            let (digits, radix) = match s.strip_prefix("0x") {
                Some(hex_digits) => (hex_digits, 16),
                None => (s.as_str(), 10),
            };
            U256::from_str_radix(digits, radix)
                .map_err(|_| CryptoError::TypedData(format!("bad uint {s:?}")))
        }
        other => Err(CryptoError::TypedData(format!("bad uint {other}"))),
    }
}

fn parse_int(value: &Value) -> Result<U256> {
    let signed: i128 = match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| CryptoError::TypedData(format!("bad int {n}")))?,
        Value::String(s) => s
            .parse()
            .map_err(|_| CryptoError::TypedData(format!("bad int {s:?}")))?,
        other => return Err(CryptoError::TypedData(format!("bad int {other}"))),
    };
    // Two's-complement into the 256-bit word.
    if signed >= 0 {
        Ok(U256::from(signed as u128))
    } else {
        Ok(U256::MAX - U256::from(signed.unsigned_abs()) + U256::from(1u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The worked example from the EIP-712 specification.
    const MAIL_JSON: &str = r#"{
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "Person": [
                {"name": "name", "type": "string"},
                {"name": "wallet", "type": "address"}
            ],
            "Mail": [
                {"name": "from", "type": "Person"},
                {"name": "to", "type": "Person"},
                {"name": "contents", "type": "string"}
            ]
        },
        "primaryType": "Mail",
        "domain": {
            "name": "Ether Mail",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
            "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
            "contents": "Hello, Bob!"
        }
    }"#;

    #[test]
    fn mail_example_encode_type() {
        let typed = TypedData::from_json(MAIL_JSON).unwrap();
        assert_eq!(
            typed.encode_type("Mail").unwrap(),
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
        );
    }

    #[test]
    fn mail_example_domain_separator() {
        let typed = TypedData::from_json(MAIL_JSON).unwrap();
        assert_eq!(
            typed.domain_separator().unwrap().to_string(),
            "0xf2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );
    }

    #[test]
    fn mail_example_signing_hash() {
        let typed = TypedData::from_json(MAIL_JSON).unwrap();
        assert_eq!(
            typed.signing_hash().unwrap().to_string(),
            "0xbe609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn synthesized_domain_matches_declared_domain() {
        let typed = TypedData::from_json(MAIL_JSON).unwrap();
        let mut without = typed.clone();
        without.types.remove("EIP712Domain");
        assert_eq!(
            without.domain_separator().unwrap(),
            typed.domain_separator().unwrap()
        );
    }

    #[test]
    fn arrays_hash_elementwise() {
        let json = r#"{
            "types": {
                "Batch": [{"name": "ids", "type": "uint256[]"}]
            },
            "primaryType": "Batch",
            "domain": {"name": "t", "version": "1", "chainId": 1},
            "message": {"ids": [1, "2", "0x03"]}
        }"#;
        let typed = TypedData::from_json(json).unwrap();

        // Mixed number/decimal/hex spellings of the same values hash
        // identically to the canonical spelling.
        let canonical = r#"{
            "types": {
                "Batch": [{"name": "ids", "type": "uint256[]"}]
            },
            "primaryType": "Batch",
            "domain": {"name": "t", "version": "1", "chainId": 1},
            "message": {"ids": ["1", "2", "3"]}
        }"#;
        assert_eq!(
            typed.signing_hash().unwrap(),
            TypedData::from_json(canonical).unwrap().signing_hash().unwrap()
        );
    }

    #[test]
    fn missing_message_field_is_an_error() {
        let json = r#"{
            "types": {"T": [{"name": "a", "type": "uint256"}]},
            "primaryType": "T",
            "domain": {"chainId": 1},
            "message": {}
        }"#;
        let typed = TypedData::from_json(json).unwrap();
        assert!(matches!(
            typed.signing_hash(),
            Err(CryptoError::TypedData(_))
        ));
    }

    #[test]
    fn negative_ints_use_twos_complement() {
        let json = r#"{
            "types": {"T": [{"name": "a", "type": "int256"}]},
            "primaryType": "T",
            "domain": {"chainId": 1},
            "message": {"a": -1}
        }"#;
        let typed = TypedData::from_json(json).unwrap();
        // enc(-1) is the all-ones word; just assert it hashes without error
        // and differs from enc(1).
        let negative = typed.signing_hash().unwrap();
        let positive = TypedData::from_json(&json.replace("-1", "1"))
            .unwrap()
            .signing_hash()
            .unwrap();
        assert_ne!(negative, positive);
    }
}
