//! Bytecode adaptation for simulated networks.
//!
//! Some contracts embed a fingerprint computed at compile time, typically the
//! init code hash of a pair contract used to derive pair addresses. On a local
//! network that fingerprint differs from the one the locally deployed factory
//! reports, so the placeholder is swapped for the probed value before the
//! bytecode is deployed. Live networks always get the bytecode unchanged.

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{B256, Bytes},
};
use anyhow::{Context, Result};

use crate::{BytecodePatch, abi};

/// Replace every non-overlapping occurrence of `placeholder` in `code`.
///
/// Returns the new code and the number of replacements.
pub fn replace_all(code: &[u8], placeholder: &B256, replacement: &B256) -> (Vec<u8>, usize) {
    let needle = placeholder.as_slice();
    let mut out = Vec::with_capacity(code.len());
    let mut count = 0;
    let mut i = 0;

    while i < code.len() {
        if code[i..].starts_with(needle) {
            out.extend_from_slice(replacement.as_slice());
            i += needle.len();
            count += 1;
        } else {
            out.push(code[i]);
            i += 1;
        }
    }

    (out, count)
}

/// Applies a unit's [`BytecodePatch`] according to the network kind.
#[derive(Debug, Clone, Copy)]
pub struct BytecodeAdapter {
    live: bool,
}

impl BytecodeAdapter {
    pub fn new(live: bool) -> Self {
        Self { live }
    }

    /// Whether `patch` has to be applied, i.e. whether its probe must be evaluated.
    pub fn needs_probe(&self, patch: Option<&BytecodePatch>) -> bool {
        !self.live && patch.is_some()
    }

    /// Adapt `bytecode` for the network. `fingerprint` is the probed value and
    /// is only used on simulated networks.
    pub fn adapt(
        &self,
        unit: &str,
        bytecode: &Bytes,
        patch: Option<&BytecodePatch>,
        fingerprint: Option<B256>,
    ) -> Bytes {
        let (Some(patch), Some(fingerprint), false) = (patch, fingerprint, self.live) else {
            return bytecode.clone();
        };

        let (code, count) = replace_all(bytecode, &patch.placeholder, &fingerprint);
        if count == 0 {
            tracing::warn!(
                unit,
                placeholder = %patch.placeholder,
                "Placeholder not found in bytecode, deploying it unchanged"
            );
        } else {
            tracing::debug!(unit, count, fingerprint = %fingerprint, "Bytecode patched");
        }
        code.into()
    }
}

/// Calldata of a probe call.
///
/// `method` is either a full signature (`pairCodeHash()`) or a bare name looked
/// up in `abi`. Without an ABI a bare name is taken as a parameterless method.
pub fn probe_calldata(method: &str, abi: Option<&JsonAbi>) -> Result<Bytes> {
    if method.contains('(') {
        return abi::selector_calldata(method);
    }

    match abi {
        Some(abi) => {
            let function = abi::find_function(abi, method)?;
            if !function.inputs.is_empty() {
                anyhow::bail!("Probe method `{}` must not take arguments", function.signature());
            }
            abi::encode_call(function, &[])
        }
        None => abi::selector_calldata(&format!("{method}()")),
    }
}

/// First 32-byte word of a call result.
pub fn decode_word(output: &[u8]) -> Result<B256> {
    let word = output
        .get(..32)
        .with_context(|| format!("Probe returned {} bytes, expected at least 32", output.len()))?;
    Ok(B256::from_slice(word))
}
