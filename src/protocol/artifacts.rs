//! Files produced by the contract and circuit toolchains
//!
//! * `<Name>.abi` / `<Name>.bin` from `solc`
//! * the proof file (`A`, `A_p`, `B`, ... `K`)
//! * the verification key file (`IC`)
//!
//! Proof and key files come either as a JSON object or as a list of
//! `NAME = value` assignments whose values are nested lists of decimal or
//! `0x` hex integers, quoted or bare.

use ethabi::ethereum_types::U256;
use ethabi::Contract;
use num_bigint::BigUint;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::error::{Error, Result};
use crate::protocol::contracts::{to_u256, ContractCall};
use crate::utils::parse_hex;

/// An elliptic curve point over the base field, `[x, y]`
pub type G1Point = [U256; 2];

/// A point over the quadratic extension, `[[x0, x1], [y0, y1]]`
pub type G2Point = [G1Point; 2];

/// Compiled contract: ABI plus creation bytecode
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    name: String,
    abi: Contract,
    bytecode: Vec<u8>,
}

impl ContractArtifact {
    /// Load `<dir>/<name>.abi` and `<dir>/<name>.bin`
    pub fn load(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        Self::from_paths(
            dir.join(format!("{}.abi", name)),
            dir.join(format!("{}.bin", name)),
        )
    }

    /// Load from explicit ABI and bytecode paths
    pub fn from_paths(abi_path: impl AsRef<Path>, bin_path: impl AsRef<Path>) -> Result<Self> {
        let abi_path = abi_path.as_ref();
        let name = abi_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::config(format!("Invalid ABI path: {}", abi_path.display())))?
            .to_string();

        let abi = Contract::load(File::open(abi_path)?)
            .map_err(|e| Error::abi(format!("{}: {}", abi_path.display(), e)))?;
        let bytecode = parse_hex(&std::fs::read_to_string(bin_path)?)?;

        Self::new(name, abi, bytecode)
    }

    /// Assemble from parts
    pub fn new(name: impl Into<String>, abi: Contract, bytecode: Vec<u8>) -> Result<Self> {
        let name = name.into();
        if bytecode.is_empty() {
            return Err(Error::abi(format!("{} has empty bytecode", name)));
        }
        if let Some(constructor) = &abi.constructor {
            if !constructor.inputs.is_empty() {
                return Err(Error::abi(format!(
                    "{} constructor takes arguments, which are not supported",
                    name
                )));
            }
        }
        Ok(Self {
            name,
            abi,
            bytecode,
        })
    }

    /// Contract name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed ABI
    pub fn abi(&self) -> &Contract {
        &self.abi
    }

    /// Creation bytecode
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Check that the ABI declares a function matching `call`
    pub fn check_call(&self, call: &ContractCall) -> Result<()> {
        let functions = self.abi.functions_by_name(call.method()).map_err(|_| {
            Error::abi(format!("{} has no function {}", self.name, call.method()))
        })?;

        let matches = functions.iter().any(|f| {
            f.inputs.len() == call.params().len()
                && f.inputs.iter().zip(call.params()).all(|(p, t)| &p.kind == t)
        });
        if matches {
            Ok(())
        } else {
            Err(Error::abi(format!(
                "{} has no overload {}",
                self.name,
                call.signature()
            )))
        }
    }
}

/// PGHR13 proof as emitted by the circuit toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// A
    pub a: G1Point,
    /// A'
    pub a_p: G1Point,
    /// B, over the extension field
    pub b: G2Point,
    /// B'
    pub b_p: G1Point,
    /// C
    pub c: G1Point,
    /// C'
    pub c_p: G1Point,
    /// H
    pub h: G1Point,
    /// K
    pub k: G1Point,
}

impl Proof {
    /// Parse a proof file
    pub fn parse(text: &str) -> Result<Self> {
        let values = parse_assignments(text)?;
        let g1 = |key: &str| lookup(&values, key).and_then(|n| n.g1(key));

        Ok(Self {
            a: g1("A")?,
            a_p: g1("A_p")?,
            b: lookup(&values, "B").and_then(|n| n.g2("B"))?,
            b_p: g1("B_p")?,
            c: g1("C")?,
            c_p: g1("C_p")?,
            h: g1("H")?,
            k: g1("K")?,
        })
    }

    /// Read and parse a proof file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

/// The `IC` points of a verification key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    /// One point per public input, plus one
    pub ic: Vec<G1Point>,
}

impl VerificationKey {
    /// Parse a verification key file
    pub fn parse(text: &str) -> Result<Self> {
        let values = parse_assignments(text)?;
        let ic = lookup(&values, "IC")?
            .list("IC")?
            .iter()
            .enumerate()
            .map(|(i, n)| n.g1(&format!("IC[{}]", i)))
            .collect::<Result<Vec<_>>>()?;
        if ic.is_empty() {
            return Err(Error::malformed_input("Verification key has no IC points"));
        }
        Ok(Self { ic })
    }

    /// Read and parse a verification key file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

/// A parsed value: an integer or a list of values
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Int(BigUint),
    List(Vec<Node>),
}

impl Node {
    fn list(&self, what: &str) -> Result<&[Node]> {
        match self {
            Node::List(items) => Ok(items),
            Node::Int(_) => Err(Error::malformed_input(format!("{} must be a list", what))),
        }
    }

    fn int(&self, what: &str) -> Result<U256> {
        match self {
            Node::Int(v) => to_u256(v),
            Node::List(_) => Err(Error::malformed_input(format!("{} must be an integer", what))),
        }
    }

    fn g1(&self, what: &str) -> Result<G1Point> {
        match self.list(what)? {
            [x, y] => Ok([x.int(what)?, y.int(what)?]),
            other => Err(Error::malformed_input(format!(
                "{} must have 2 coordinates, got {}",
                what,
                other.len()
            ))),
        }
    }

    fn g2(&self, what: &str) -> Result<G2Point> {
        match self.list(what)? {
            [x, y] => Ok([x.g1(what)?, y.g1(what)?]),
            other => Err(Error::malformed_input(format!(
                "{} must have 2 coordinate pairs, got {}",
                what,
                other.len()
            ))),
        }
    }

    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(Node::from_json)
                .collect::<Result<_>>()
                .map(Node::List),
            Value::String(s) => parse_int(s).map(Node::Int),
            Value::Number(n) => n
                .as_u64()
                .map(|v| Node::Int(BigUint::from(v)))
                .ok_or_else(|| Error::malformed_input(format!("Invalid integer {}", n))),
            other => Err(Error::malformed_input(format!("Unexpected value {}", other))),
        }
    }
}

fn lookup<'a>(values: &'a HashMap<String, Node>, key: &str) -> Result<&'a Node> {
    values
        .get(key)
        .ok_or_else(|| Error::malformed_input(format!("Missing {}", key)))
}

fn parse_int(s: &str) -> Result<BigUint> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
        None => BigUint::parse_bytes(s.as_bytes(), 10),
    };
    parsed.ok_or_else(|| Error::malformed_input(format!("Invalid integer '{}'", s)))
}

fn parse_assignments(text: &str) -> Result<HashMap<String, Node>> {
    if text.trim_start().starts_with('{') {
        let value: Value = serde_json::from_str(text)?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::malformed_input("Expected a JSON object"))?;
        return object
            .iter()
            .map(|(k, v)| Node::from_json(v).map(|n| (k.clone(), n)))
            .collect();
    }

    let tokens = tokenize(text)?;
    let mut pos = 0;
    let mut values = HashMap::new();

    while pos < tokens.len() {
        let name = match &tokens[pos] {
            Tok::Word(w) => w.clone(),
            other => {
                return Err(Error::malformed_input(format!(
                    "Expected a name, found {:?}",
                    other
                )))
            }
        };
        if tokens.get(pos + 1) != Some(&Tok::Eq) {
            return Err(Error::malformed_input(format!("Expected '=' after {}", name)));
        }
        pos += 2;
        let node = parse_node(&tokens, &mut pos)?;
        values.insert(name, node);
    }

    Ok(values)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Word(String),
    Eq,
    Open,
    Close,
    Comma,
}

fn tokenize(text: &str) -> Result<Vec<Tok>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '#' => {
                while chars.next_if(|&c| c != '\n').is_some() {}
            }
            c if c.is_whitespace() || c == ';' => {
                chars.next();
            }
            '=' => {
                chars.next();
                tokens.push(Tok::Eq);
            }
            '[' | '(' => {
                chars.next();
                tokens.push(Tok::Open);
            }
            ']' | ')' => {
                chars.next();
                tokens.push(Tok::Close);
            }
            ',' => {
                chars.next();
                tokens.push(Tok::Comma);
            }
            '"' | '\'' => {
                chars.next();
                let mut word = String::new();
                loop {
                    match chars.next() {
                        Some(q) if q == c => break,
                        Some(ch) => word.push(ch),
                        None => return Err(Error::malformed_input("Unterminated string")),
                    }
                }
                tokens.push(Tok::Word(word));
            }
            _ => {
                let mut word = String::new();
                while let Some(ch) =
                    chars.next_if(|&ch| ch.is_alphanumeric() || ch == '_' || ch == '.')
                {
                    word.push(ch);
                }
                if word.is_empty() {
                    return Err(Error::malformed_input(format!("Unexpected character '{}'", c)));
                }
                tokens.push(Tok::Word(word));
            }
        }
    }

    Ok(tokens)
}

fn parse_node(tokens: &[Tok], pos: &mut usize) -> Result<Node> {
    match tokens.get(*pos) {
        Some(Tok::Word(w)) => {
            *pos += 1;
            parse_int(w).map(Node::Int)
        }
        Some(Tok::Open) => {
            *pos += 1;
            let mut items = Vec::new();
            loop {
                if tokens.get(*pos) == Some(&Tok::Close) {
                    *pos += 1;
                    break;
                }
                items.push(parse_node(tokens, pos)?);
                match tokens.get(*pos) {
                    Some(Tok::Comma) => *pos += 1,
                    Some(Tok::Close) => {}
                    other => {
                        return Err(Error::malformed_input(format!(
                            "Expected ',' or ']', found {:?}",
                            other
                        )))
                    }
                }
            }
            Ok(Node::List(items))
        }
        other => Err(Error::malformed_input(format!(
            "Expected a value, found {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const PROOF_ASSIGNMENTS: &str = r#"
# generated proof
A = [0x1, 0x2]
A_p = [0x3, 0x4]
B = [[0x5, 0x6], [0x7, 0x8]]
B_p = [9, 10]
C = ["0xb", "0xc"]
C_p = [13,
       14]
H = [0xf, 0x10]
K = [0x11, 0x12]
"#;

    const STORE_ABI: &str = r#"[
        {"type":"constructor","inputs":[],"stateMutability":"nonpayable"},
        {"type":"function","name":"get_header_hash","stateMutability":"nonpayable",
         "inputs":[{"name":"block_number","type":"uint256"}],
         "outputs":[{"name":"","type":"bytes32"}]}
    ]"#;

    #[test]
    fn test_parse_proof_assignments() {
        let proof = Proof::parse(PROOF_ASSIGNMENTS).unwrap();
        assert_eq!(proof.a, [U256::from(1), U256::from(2)]);
        assert_eq!(proof.b[1], [U256::from(7), U256::from(8)]);
        assert_eq!(proof.b_p, [U256::from(9), U256::from(10)]);
        assert_eq!(proof.c, [U256::from(11), U256::from(12)]);
        assert_eq!(proof.c_p, [U256::from(13), U256::from(14)]);
        assert_eq!(proof.k, [U256::from(17), U256::from(18)]);
    }

    #[test]
    fn test_parse_proof_json() {
        let json = serde_json::json!({
            "A": ["0x1", "0x2"], "A_p": [3, 4], "B": [["5", "6"], ["7", "8"]],
            "B_p": [9, 10], "C": [11, 12], "C_p": [13, 14], "H": [15, 16], "K": [17, 18]
        });
        let from_json = Proof::parse(&json.to_string()).unwrap();
        assert_eq!(from_json, Proof::parse(PROOF_ASSIGNMENTS).unwrap());
    }

    #[test]
    fn test_parse_proof_errors() {
        assert!(Proof::parse("A = [1, 2]").is_err());
        assert!(Proof::parse(&PROOF_ASSIGNMENTS.replace("A = [0x1, 0x2]", "A = [0x1]")).is_err());
        assert!(Proof::parse("A = [1, 2").is_err());
        assert!(Proof::parse("A [1, 2]").is_err());
    }

    #[test]
    fn test_parse_verification_key() {
        let vk = VerificationKey::parse("IC = [[0x1, 0x2], [0x3, 0x4], [5, 6]]").unwrap();
        assert_eq!(vk.ic.len(), 3);
        assert_eq!(vk.ic[2], [U256::from(5), U256::from(6)]);

        assert!(VerificationKey::parse("IC = []").is_err());
        assert!(VerificationKey::parse("vk = 1").is_err());
    }

    #[test]
    fn test_load_artifact() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("BTCHeaderStore.abi"), STORE_ABI).unwrap();
        std::fs::write(dir.path().join("BTCHeaderStore.bin"), "6080604052\n").unwrap();

        let artifact = ContractArtifact::load(dir.path(), "BTCHeaderStore").unwrap();
        assert_eq!(artifact.name(), "BTCHeaderStore");
        assert_eq!(artifact.bytecode(), &[0x60, 0x80, 0x60, 0x40, 0x52]);

        let call = crate::protocol::contracts::get_header_hash(1).unwrap();
        artifact.check_call(&call).unwrap();

        let call =
            crate::protocol::contracts::set_header_contract_addr(Default::default()).unwrap();
        assert!(matches!(artifact.check_call(&call), Err(Error::Abi(_))));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ContractArtifact::load(dir.path(), "Verifier"),
            Err(Error::Io(_))
        ));
    }
}
