//! ABI encoded calls to the header store and verifier contracts

use ethabi::ethereum_types::U256;
use ethabi::{ParamType, Token};
use num_bigint::BigUint;

use crate::core::BlockHeader;
use crate::error::{Error, Result};
use crate::protocol::artifacts::{G1Point, Proof};
use crate::protocol::rpc::Address;

/// A contract method invocation: name, parameter types and argument tokens
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    method: String,
    params: Vec<ParamType>,
    tokens: Vec<Token>,
}

impl ContractCall {
    /// Build a call, checking every token against its declared type
    pub fn new(
        method: impl Into<String>,
        params: Vec<ParamType>,
        tokens: Vec<Token>,
    ) -> Result<Self> {
        let method = method.into();
        if params.len() != tokens.len() {
            return Err(Error::abi(format!(
                "{} takes {} arguments, got {}",
                method,
                params.len(),
                tokens.len()
            )));
        }
        if let Some((i, (param, _))) = params
            .iter()
            .zip(&tokens)
            .enumerate()
            .find(|(_, (param, token))| !token.type_check(param))
        {
            return Err(Error::abi(format!(
                "{} argument {} does not match type {}",
                method, i, param
            )));
        }

        Ok(Self {
            method,
            params,
            tokens,
        })
    }

    /// Method name
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Parameter types
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Canonical signature, e.g. `get_header_hash(uint256)`
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({})", self.method, params)
    }

    /// Four byte method selector
    pub fn selector(&self) -> [u8; 4] {
        ethabi::short_signature(&self.method, &self.params)
    }

    /// Transaction data: selector followed by the encoded arguments
    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.selector().to_vec();
        data.extend(ethabi::encode(&self.tokens));
        data
    }
}

fn uint256() -> ParamType {
    ParamType::Uint(256)
}

fn uint_array(len: usize) -> ParamType {
    ParamType::FixedArray(Box::new(uint256()), len)
}

/// Convert an unsigned integer to a 256-bit word
pub fn to_u256(value: &BigUint) -> Result<U256> {
    if value.bits() > 256 {
        return Err(Error::abi(format!("{} does not fit in uint256", value)));
    }
    Ok(U256::from_big_endian(&value.to_bytes_be()))
}

fn g1_token(point: &G1Point) -> Token {
    Token::FixedArray(point.iter().map(|c| Token::Uint(*c)).collect())
}

/// `store_block_header(uint256,bytes4,bytes32,bytes32,bytes4,bytes4,bytes4)`
pub fn store_block_header(header: &BlockHeader) -> Result<ContractCall> {
    ContractCall::new(
        "store_block_header",
        vec![
            uint256(),
            ParamType::FixedBytes(4),
            ParamType::FixedBytes(32),
            ParamType::FixedBytes(32),
            ParamType::FixedBytes(4),
            ParamType::FixedBytes(4),
            ParamType::FixedBytes(4),
        ],
        vec![
            Token::Uint(U256::from(header.block_number)),
            Token::FixedBytes(header.version.to_vec()),
            Token::FixedBytes(header.hash_prev.to_vec()),
            Token::FixedBytes(header.merkle_root.to_vec()),
            Token::FixedBytes(header.timestamp.to_vec()),
            Token::FixedBytes(header.nbits.to_vec()),
            Token::FixedBytes(header.nonce.to_vec()),
        ],
    )
}

/// `get_header_hash(uint256)`
pub fn get_header_hash(block_number: u64) -> Result<ContractCall> {
    ContractCall::new(
        "get_header_hash",
        vec![uint256()],
        vec![Token::Uint(U256::from(block_number))],
    )
}

/// `set_header_contract_addr(address)`, the verifier's one-time link to the
/// header store
pub fn set_header_contract_addr(store: Address) -> Result<ContractCall> {
    ContractCall::new(
        "set_header_contract_addr",
        vec![ParamType::Address],
        vec![Token::Address(store)],
    )
}

/// `update_verification_params(uint256,uint256,uint256)` for one IC point
pub fn update_verification_params(index: usize, point: &G1Point) -> Result<ContractCall> {
    ContractCall::new(
        "update_verification_params",
        vec![uint256(), uint256(), uint256()],
        vec![
            Token::Uint(U256::from(index as u64)),
            Token::Uint(point[0]),
            Token::Uint(point[1]),
        ],
    )
}

/// `verifyTx` with a PGHR13 proof and the public inputs
pub fn verify_tx(proof: &Proof, inputs: &[BigUint]) -> Result<ContractCall> {
    let g1 = uint_array(2);
    let g2 = ParamType::FixedArray(Box::new(uint_array(2)), 2);

    let input_tokens = inputs
        .iter()
        .map(|v| to_u256(v).map(Token::Uint))
        .collect::<Result<Vec<_>>>()?;

    ContractCall::new(
        "verifyTx",
        vec![
            g1.clone(),
            g1.clone(),
            g2,
            g1.clone(),
            g1.clone(),
            g1.clone(),
            g1.clone(),
            g1,
            uint_array(inputs.len()),
        ],
        vec![
            g1_token(&proof.a),
            g1_token(&proof.a_p),
            Token::FixedArray(proof.b.iter().map(g1_token).collect()),
            g1_token(&proof.b_p),
            g1_token(&proof.c),
            g1_token(&proof.c_p),
            g1_token(&proof.h),
            g1_token(&proof.k),
            Token::FixedArray(input_tokens),
        ],
    )
}
