//! Patch a ZoKrates generated `verifier.sol` so that a successful proof
//! marks the covered header as verified in the header store.

use crate::error::{Error, Result};

const HEADER: &str = "
/**
 * Large portion of this file was auto-generated using ZoKrates tool.
 * Modifications for the BTC SNARK relay mark a bitcoin header on the
 * BTCHeaderStore contract as verified once its proof checks out.
 */
";

const IMPORT: &str = "
import \"./btc_store.sol\";

";

const STORE_FIELD: &str = "
    address m_header_contract_addr = address(0);

";

const STORE_SETTER: &str = "
    /**
     * @dev One time setting
     */
    function set_header_contract_addr(address addr) public {
        require(m_header_contract_addr == address(0));
        m_header_contract_addr = addr;
    }

";

const MARK_VERIFIED: &str = "
            /* Mark header verified */
            require(BTCHeaderStore(m_header_contract_addr).mark_verified(input[0]) == true);

";

const PRAGMA: &str = "pragma solidity";
const CONTRACT: &str = "contract Verifier {";
const VERIFYING_KEY: &str = "function verifyingKey()";
const VERIFY_CHECK: &str = "if (verify(inputValues, proof) == 0";

/// Insert the header-store hooks into verifier source.
///
/// * licence header before, and the store import after, the pragma line
/// * the store address field after the first line of the contract body
/// * the one-time setter before `verifyingKey()`
/// * the `mark_verified` call inside the successful verification branch
pub fn augment_verifier(source: &str) -> Result<String> {
    let mut lines: Vec<String> = source.split_inclusive('\n').map(str::to_string).collect();

    let index = find(&lines, PRAGMA)?;
    lines.insert(index + 1, IMPORT.to_string());
    lines.insert(index, HEADER.to_string());

    let index = find(&lines, CONTRACT)?;
    lines.insert((index + 2).min(lines.len()), STORE_FIELD.to_string());

    let index = find(&lines, VERIFYING_KEY)?;
    lines.insert(index, STORE_SETTER.to_string());

    let index = find(&lines, VERIFY_CHECK)?;
    lines.insert(index + 1, MARK_VERIFIED.to_string());

    Ok(lines.concat())
}

fn find(lines: &[String], pattern: &str) -> Result<usize> {
    lines
        .iter()
        .position(|line| line.contains(pattern))
        .ok_or_else(|| {
            Error::malformed_input(format!(
                "Verifier source has no line containing '{}'",
                pattern
            ))
        })
}
